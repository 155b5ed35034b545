//! Playback session: at most one clip playing, keyed by its path.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::device::{AudioBackend, PlaybackDevice};
use crate::error::VoiceError;
use crate::timer::SessionTimer;

/// Playback state of a single record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

struct ActivePlayback {
    device: Box<dyn PlaybackDevice>,
    path: PathBuf,
}

/// Owns the playback device. At most one clip plays at a time, identified by
/// its path rather than its position in the list.
#[derive(Default)]
pub struct PlaybackSession {
    active: Option<ActivePlayback>,
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the clip currently playing.
    pub fn playing(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    pub fn is_playing(&self) -> bool {
        self.active.is_some()
    }

    pub fn state_of(&self, path: &Path) -> PlaybackState {
        match self.playing() {
            Some(p) if p == path => PlaybackState::Playing,
            _ => PlaybackState::Stopped,
        }
    }

    /// Open a fresh playback device on `path`, start output and start the
    /// timer. Rejected while another clip is playing; the caller stops it
    /// first.
    pub fn start(
        &mut self,
        path: &Path,
        backend: &dyn AudioBackend,
        timer: &mut SessionTimer,
    ) -> Result<(), VoiceError> {
        if self.active.is_some() {
            return Err(VoiceError::PlaybackActive);
        }

        let mut device = backend.playback_device();
        let opened = device
            .set_source(path)
            .and_then(|_| device.prepare())
            .and_then(|_| device.start());
        if let Err(e) = opened {
            device.release();
            warn!("failed to play {}: {e}", path.display());
            return Err(VoiceError::PlaybackUnavailable(e.to_string()));
        }

        timer.start();
        info!("playback started: {}", path.display());
        self.active = Some(ActivePlayback {
            device,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Halt output, release the device and cancel the timer. Returns the path
    /// that was playing.
    pub fn stop(&mut self, timer: &mut SessionTimer) -> Result<PathBuf, VoiceError> {
        let ActivePlayback { mut device, path } =
            self.active.take().ok_or(VoiceError::NotPlaying)?;
        if let Err(e) = device.stop() {
            warn!("playback stop failed for {}: {e}", path.display());
        }
        device.release();
        timer.cancel();
        info!("playback stopped: {}", path.display());
        Ok(path)
    }

    /// True when the playing clip has been fully played out.
    pub fn is_finished(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| a.device.is_finished())
            .unwrap_or(false)
    }
}
