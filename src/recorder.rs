//! Recording session: one capture device from start to stop.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::device::{AudioBackend, AudioSource, CaptureDevice, CaptureSpec, ContainerFormat};
use crate::error::VoiceError;
use crate::timer::SessionTimer;

/// File name pattern of a new clip, without extension.
pub const FILE_NAME_FORMAT: &str = "%d_%m_%Y_%H_%M_%S";

/// Recording state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
}

/// Configuration for the recording session.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Directory where recordings are saved.
    pub output_dir: PathBuf,
    /// Name of the selected input device (None = use default).
    pub input_device: Option<String>,
    pub container: ContainerFormat,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: crate::config::default_recordings_dir(),
            input_device: None,
            container: ContainerFormat::default(),
        }
    }
}

struct ActiveCapture {
    device: Box<dyn CaptureDevice>,
    path: PathBuf,
}

/// Owns the capture device for the duration of one recording.
pub struct RecordingSession {
    pub config: RecorderConfig,
    active: Option<ActiveCapture>,
}

impl RecordingSession {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            active: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        if self.active.is_some() {
            RecorderState::Recording
        } else {
            RecorderState::Idle
        }
    }

    /// Path of the clip being written, while recording.
    pub fn current_file(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    /// Open a fresh capture device, start writing a new clip and start the
    /// timer. Returns the clip's path.
    ///
    /// Any device failure releases the device and leaves the session `Idle`.
    pub fn start(
        &mut self,
        backend: &dyn AudioBackend,
        timer: &mut SessionTimer,
    ) -> Result<PathBuf, VoiceError> {
        if self.active.is_some() {
            return Err(VoiceError::AlreadyRecording);
        }

        let output_path = unique_output_path(
            &self.config.output_dir,
            Local::now(),
            self.config.container,
        );

        let spec = CaptureSpec {
            source: AudioSource::Microphone {
                device_name: self.config.input_device.clone(),
            },
            container: self.config.container,
            output_path: output_path.clone(),
            codec: self.config.container.codec(),
        };

        let mut device = backend.capture_device();
        let opened = device
            .configure(&spec)
            .and_then(|_| device.prepare())
            .and_then(|_| device.start());
        if let Err(e) = opened {
            device.release();
            if output_path.exists() {
                let _ = fs::remove_file(&output_path);
            }
            warn!("failed to start recording: {e}");
            return Err(VoiceError::CaptureUnavailable(e.to_string()));
        }

        timer.start();
        info!("recording started: {}", output_path.display());
        self.active = Some(ActiveCapture {
            device,
            path: output_path.clone(),
        });
        Ok(output_path)
    }

    /// Finalize the clip, release the device, stop the timer and zero the
    /// elapsed counter. Returns the saved path.
    ///
    /// The session is `Idle` afterwards even if finalizing failed.
    pub fn stop(&mut self, timer: &mut SessionTimer) -> Result<PathBuf, VoiceError> {
        let ActiveCapture { mut device, path } =
            self.active.take().ok_or(VoiceError::NotRecording)?;

        let stopped = device.stop();
        device.release();
        timer.cancel();
        timer.reset();

        match stopped {
            Ok(()) => {
                info!("recording saved: {}", path.display());
                Ok(path)
            }
            Err(e) => {
                warn!("failed to finalize {}: {e}", path.display());
                Err(VoiceError::CaptureUnavailable(e.to_string()))
            }
        }
    }
}

/// Name of a clip started at `now`, e.g. `21_02_2026_14_30_52.mp3`.
pub fn generate_filename(now: DateTime<Local>, container: ContainerFormat) -> String {
    format!("{}.{}", now.format(FILE_NAME_FORMAT), container.extension())
}

/// Output path for a clip started at `now`. A clip started within the same
/// second as an existing one gets a `_2`, `_3`, ... suffix.
fn unique_output_path(dir: &Path, now: DateTime<Local>, container: ContainerFormat) -> PathBuf {
    let first = dir.join(generate_filename(now, container));
    if !first.exists() {
        return first;
    }
    let stem = now.format(FILE_NAME_FORMAT);
    (2u32..)
        .map(|n| dir.join(format!("{stem}_{n}.{}", container.extension())))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, PlaybackDevice};
    use chrono::TimeZone;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Script {
        fail_prepare: bool,
        calls: Vec<&'static str>,
    }

    struct ScriptedCapture(Rc<RefCell<Script>>);

    impl CaptureDevice for ScriptedCapture {
        fn configure(&mut self, _spec: &CaptureSpec) -> Result<(), DeviceError> {
            self.0.borrow_mut().calls.push("configure");
            Ok(())
        }
        fn prepare(&mut self) -> Result<(), DeviceError> {
            let mut s = self.0.borrow_mut();
            s.calls.push("prepare");
            if s.fail_prepare {
                Err(DeviceError::NoInputDevice)
            } else {
                Ok(())
            }
        }
        fn start(&mut self) -> Result<(), DeviceError> {
            self.0.borrow_mut().calls.push("start");
            Ok(())
        }
        fn stop(&mut self) -> Result<(), DeviceError> {
            self.0.borrow_mut().calls.push("stop");
            Ok(())
        }
        fn release(&mut self) {
            self.0.borrow_mut().calls.push("release");
        }
    }

    struct ScriptedBackend(Rc<RefCell<Script>>);

    impl AudioBackend for ScriptedBackend {
        fn capture_device(&self) -> Box<dyn CaptureDevice> {
            Box::new(ScriptedCapture(self.0.clone()))
        }
        fn playback_device(&self) -> Box<dyn PlaybackDevice> {
            unreachable!("recording tests never play")
        }
    }

    fn session(dir: &Path) -> RecordingSession {
        RecordingSession::new(RecorderConfig {
            output_dir: dir.to_path_buf(),
            input_device: None,
            container: ContainerFormat::Mp3,
        })
    }

    #[test]
    fn test_start_stop_lifecycle() {
        let tmp = tempfile::tempdir().unwrap();
        let script = Rc::new(RefCell::new(Script::default()));
        let backend = ScriptedBackend(script.clone());
        let mut timer = SessionTimer::default();
        let mut rec = session(tmp.path());

        let path = rec.start(&backend, &mut timer).unwrap();
        assert_eq!(rec.state(), RecorderState::Recording);
        assert_eq!(rec.current_file(), Some(path.as_path()));
        assert!(timer.is_running());
        timer.tick();

        let saved = rec.stop(&mut timer).unwrap();
        assert_eq!(saved, path);
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(!timer.is_running());
        assert_eq!(timer.elapsed(), 0);
        assert_eq!(
            script.borrow().calls,
            vec!["configure", "prepare", "start", "stop", "release"]
        );
    }

    #[test]
    fn test_double_start_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend(Rc::new(RefCell::new(Script::default())));
        let mut timer = SessionTimer::default();
        let mut rec = session(tmp.path());

        rec.start(&backend, &mut timer).unwrap();
        assert_eq!(
            rec.start(&backend, &mut timer),
            Err(VoiceError::AlreadyRecording)
        );
        assert_eq!(rec.state(), RecorderState::Recording);
    }

    #[test]
    fn test_stop_when_not_recording() {
        let mut rec = session(Path::new("/tmp/unused"));
        let mut timer = SessionTimer::default();
        assert_eq!(rec.stop(&mut timer), Err(VoiceError::NotRecording));
    }

    #[test]
    fn test_prepare_failure_leaves_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let script = Rc::new(RefCell::new(Script {
            fail_prepare: true,
            ..Script::default()
        }));
        let backend = ScriptedBackend(script.clone());
        let mut timer = SessionTimer::default();
        let mut rec = session(tmp.path());

        match rec.start(&backend, &mut timer) {
            Err(VoiceError::CaptureUnavailable(msg)) => assert!(msg.contains("input device")),
            other => panic!("expected CaptureUnavailable, got: {other:?}"),
        }
        assert_eq!(rec.state(), RecorderState::Idle);
        assert!(!timer.is_running());
        assert_eq!(
            script.borrow().calls,
            vec!["configure", "prepare", "release"]
        );
    }

    #[test]
    fn test_generate_filename() {
        let at = Local.with_ymd_and_hms(2026, 2, 21, 14, 30, 52).unwrap();
        assert_eq!(
            generate_filename(at, ContainerFormat::Mp3),
            "21_02_2026_14_30_52.mp3"
        );
        assert_eq!(
            generate_filename(at, ContainerFormat::Wav),
            "21_02_2026_14_30_52.wav"
        );
    }

    #[test]
    fn test_unique_output_path_avoids_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let at = Local.with_ymd_and_hms(2026, 2, 21, 14, 30, 52).unwrap();
        let first = unique_output_path(tmp.path(), at, ContainerFormat::Wav);
        assert_eq!(first, tmp.path().join("21_02_2026_14_30_52.wav"));

        fs::write(&first, "taken").unwrap();
        let second = unique_output_path(tmp.path(), at, ContainerFormat::Wav);
        assert_eq!(second, tmp.path().join("21_02_2026_14_30_52_2.wav"));
    }
}
