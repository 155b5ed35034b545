//! Error types shared by the session state machine and the record store.

use thiserror::Error;

/// Errors surfaced by the voice recorder core.
///
/// Device and storage failures abort a single operation and leave the
/// sessions in their terminal `Idle`/`Stopped` state; none of them are fatal
/// to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    /// The capture device could not be configured, prepared or started.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The playback device could not open or prepare the clip.
    #[error("playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Delete, rename or directory listing failed at the filesystem boundary.
    #[error("storage operation failed: {0}")]
    StorageOperationFailed(String),

    /// The media container did not expose a duration.
    #[error("duration unknown: {0}")]
    DurationUnknown(String),

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    /// A playback transition was requested while a capture is in progress.
    #[error("a recording is in progress")]
    RecordingActive,

    /// A capture was requested while a clip is playing.
    #[error("a clip is playing")]
    PlaybackActive,

    #[error("nothing is playing")]
    NotPlaying,

    #[error("no record at index {0}")]
    NoSuchRecord(usize),

    /// The rename dialog for this index was closed, e.g. by a rescan.
    #[error("rename dialog for record {0} is no longer open")]
    RenameDialogClosed(usize),

    #[error("config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for VoiceError {
    fn from(e: std::io::Error) -> Self {
        VoiceError::StorageOperationFailed(e.to_string())
    }
}
