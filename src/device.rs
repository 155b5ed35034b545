//! Seams between the session state machine and the platform media stack.
//!
//! The sessions only ever talk to these traits. The cpal/rodio implementations
//! live in `capture` and `player`; tests plug in fakes.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures reported by a capture or playback device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("device not configured")]
    NotConfigured,
    #[error("device not prepared")]
    NotPrepared,
    #[error("no input device available")]
    NoInputDevice,
    #[error("no output device available")]
    NoOutputDevice,
    #[error("stream error: {0}")]
    Stream(String),
    #[error("encoder error: {0}")]
    Encoder(String),
    #[error("decoder error: {0}")]
    Decoder(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for DeviceError {
    fn from(e: std::io::Error) -> Self {
        DeviceError::Io(e.to_string())
    }
}

/// Where captured audio comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Microphone input; `None` selects the system default device.
    Microphone { device_name: Option<String> },
}

/// Container written by the capture device. Also decides the file extension.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp3,
    Wav,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp3 => "mp3",
            ContainerFormat::Wav => "wav",
        }
    }

    /// Codec paired with this container.
    pub fn codec(self) -> Codec {
        match self {
            ContainerFormat::Mp3 => Codec::Lame { kbps: 192 },
            ContainerFormat::Wav => Codec::Pcm16,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(ContainerFormat::Mp3),
            "wav" => Ok(ContainerFormat::Wav),
            other => Err(format!("unsupported container: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Mono MP3 at a constant bitrate.
    Lame { kbps: u32 },
    /// Mono 16-bit PCM.
    Pcm16,
}

/// Full capture configuration handed to [`CaptureDevice::configure`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSpec {
    pub source: AudioSource,
    pub container: ContainerFormat,
    pub output_path: PathBuf,
    pub codec: Codec,
}

/// Platform capture device: records from a source into a file.
pub trait CaptureDevice {
    fn configure(&mut self, spec: &CaptureSpec) -> Result<(), DeviceError>;
    /// Open hardware and output file. Fails on bad config or missing hardware.
    fn prepare(&mut self) -> Result<(), DeviceError>;
    fn start(&mut self) -> Result<(), DeviceError>;
    /// Stop capturing and finalize the output file.
    fn stop(&mut self) -> Result<(), DeviceError>;
    /// Free every resource. Safe to call in any state, any number of times.
    fn release(&mut self);
}

/// Platform playback device: decodes a file to the audio output.
pub trait PlaybackDevice {
    fn set_source(&mut self, path: &Path) -> Result<(), DeviceError>;
    /// Open the output and decoder. Fails on unreadable or corrupt media.
    fn prepare(&mut self) -> Result<(), DeviceError>;
    fn start(&mut self) -> Result<(), DeviceError>;
    fn stop(&mut self) -> Result<(), DeviceError>;
    /// Free every resource. Safe to call in any state, any number of times.
    fn release(&mut self);
    /// True once the whole clip has been played out.
    fn is_finished(&self) -> bool;
}

/// Factory for fresh devices; one device per session, never reused.
pub trait AudioBackend {
    fn capture_device(&self) -> Box<dyn CaptureDevice>;
    fn playback_device(&self) -> Box<dyn PlaybackDevice>;
}
