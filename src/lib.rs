pub mod audio;
pub mod capture;
pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod player;
pub mod playback;
pub mod probe;
pub mod recorder;
pub mod recordings;
pub mod timer;
pub mod upload;

pub use audio::{AudioDeviceInfo, AudioDeviceManager, CpalBackend};
pub use config::{
    clear_config_at, config_path, default_recordings_dir, load_config_from,
    resolve_recordings_dir, save_config_to, AppConfig, UploadConfig,
};
pub use controller::{RecordEntry, SessionController, TickOutcome, Transition};
pub use device::{
    AudioBackend, AudioSource, CaptureDevice, CaptureSpec, Codec, ContainerFormat, DeviceError,
    PlaybackDevice,
};
pub use error::VoiceError;
pub use playback::{PlaybackSession, PlaybackState};
pub use probe::{format_elapsed, FileProber, MediaProber, UNKNOWN_DURATION};
pub use recorder::{generate_filename, RecorderConfig, RecorderState, RecordingSession};
pub use recordings::{format_timestamp, list_records, Record, RecordStore};
pub use timer::{SessionTimer, TimerEvent, MAX_TICKS, TICK_PERIOD};
pub use upload::{upload_record, UploadError, UploadResult};
