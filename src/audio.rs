use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;
use tracing::warn;

use crate::capture::CpalCapture;
use crate::device::{AudioBackend, CaptureDevice, PlaybackDevice};
use crate::player::RodioPlayback;

/// Enumerates cpal input devices and resolves the one to record from.
pub struct AudioDeviceManager {
    host: cpal::Host,
}

/// Metadata about an audio input device.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub index: usize,
    pub is_default: bool,
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        let host = cpal::default_host();
        Self { host }
    }

    /// List all available input devices with metadata.
    pub fn list_input_devices(&self) -> Vec<AudioDeviceInfo> {
        let default_name = self.host.default_input_device().and_then(|d| d.name().ok());

        let devices = match self.host.input_devices() {
            Ok(devices) => devices,
            Err(e) => {
                warn!("failed to enumerate input devices: {e}");
                return Vec::new();
            }
        };

        devices
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                let is_default = default_name.as_deref() == Some(&name);
                Some(AudioDeviceInfo {
                    name,
                    index,
                    is_default,
                })
            })
            .collect()
    }

    pub fn default_input_device(&self) -> Option<Device> {
        self.host.default_input_device()
    }

    pub fn input_device_by_name(&self, name: &str) -> Option<Device> {
        self.host
            .input_devices()
            .ok()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
    }

    /// Resolve the named device, falling back to the system default when the
    /// name is unknown or absent.
    pub fn resolve_input_device(&self, name: Option<&str>) -> Option<Device> {
        match name {
            Some(name) => self.input_device_by_name(name).or_else(|| {
                warn!("input device '{name}' not found, falling back to system default");
                self.default_input_device()
            }),
            None => self.default_input_device(),
        }
    }
}

/// Production backend: cpal capture, rodio playback.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn capture_device(&self) -> Box<dyn CaptureDevice> {
        Box::new(CpalCapture::new())
    }

    fn playback_device(&self) -> Box<dyn PlaybackDevice> {
        Box::new(RodioPlayback::new())
    }
}
