//! rodio-backed playback device.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use tracing::debug;

use crate::device::{DeviceError, PlaybackDevice};

/// Decodes one clip to the default output device.
///
/// `OutputStream` is !Send, so like the capture device this stays on the
/// controller's thread.
#[derive(Default)]
pub struct RodioPlayback {
    source: Option<PathBuf>,
    output: Option<(OutputStream, OutputStreamHandle)>,
    sink: Option<Sink>,
}

impl RodioPlayback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlaybackDevice for RodioPlayback {
    fn set_source(&mut self, path: &Path) -> Result<(), DeviceError> {
        self.source = Some(path.to_path_buf());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        let path = self.source.as_ref().ok_or(DeviceError::NotConfigured)?;

        // Decode before touching the output so a corrupt clip fails fast.
        let file = File::open(path)?;
        let decoder =
            Decoder::new(BufReader::new(file)).map_err(|e| DeviceError::Decoder(e.to_string()))?;

        let (stream, handle) =
            OutputStream::try_default().map_err(|_| DeviceError::NoOutputDevice)?;
        let sink = Sink::try_new(&handle).map_err(|e| DeviceError::Stream(e.to_string()))?;
        sink.pause();
        sink.append(decoder);

        debug!("playback prepared: {}", path.display());
        self.output = Some((stream, handle));
        self.sink = Some(sink);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let sink = self.sink.as_ref().ok_or(DeviceError::NotPrepared)?;
        sink.play();
        Ok(())
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        let sink = self.sink.as_ref().ok_or(DeviceError::NotPrepared)?;
        sink.stop();
        Ok(())
    }

    fn release(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.output = None;
        self.source = None;
    }

    fn is_finished(&self) -> bool {
        self.sink.as_ref().map(|s| s.empty()).unwrap_or(false)
    }
}

impl Drop for RodioPlayback {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_without_source() {
        let mut player = RodioPlayback::new();
        assert_eq!(player.prepare(), Err(DeviceError::NotConfigured));
    }

    #[test]
    fn test_prepare_missing_file() {
        let mut player = RodioPlayback::new();
        player.set_source(Path::new("/nonexistent/clip.mp3")).unwrap();
        assert!(matches!(player.prepare(), Err(DeviceError::Io(_))));
    }

    #[test]
    fn test_prepare_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.wav");
        std::fs::write(&path, "definitely not audio").unwrap();

        let mut player = RodioPlayback::new();
        player.set_source(&path).unwrap();
        assert!(matches!(player.prepare(), Err(DeviceError::Decoder(_))));
        assert!(!player.is_finished());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut player = RodioPlayback::new();
        assert_eq!(player.start(), Err(DeviceError::NotPrepared));
        player.release();
        player.release();
    }
}
