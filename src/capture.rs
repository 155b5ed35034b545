//! cpal-backed capture device writing mono MP3 (LAME) or 16-bit WAV.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream};
use mp3lame_encoder::{Bitrate, Builder, Encoder, FlushNoGap, MonoPcm, Quality};
use tracing::{debug, info, warn};

use crate::audio::AudioDeviceManager;
use crate::device::{AudioSource, CaptureDevice, CaptureSpec, Codec, DeviceError};

type SharedWriter = Arc<Mutex<Option<PcmWriter>>>;

/// Records from a cpal input device into the file named by the capture spec.
///
/// NOTE: `cpal::Stream` is !Send on macOS, so this device must stay on the
/// thread that created it. The session controller never moves it.
#[derive(Default)]
pub struct CpalCapture {
    spec: Option<CaptureSpec>,
    stream: Option<Stream>,
    writer: Option<SharedWriter>,
}

impl CpalCapture {
    pub fn new() -> Self {
        Self::default()
    }

    fn finalize_writer(&mut self) -> Result<(), DeviceError> {
        let Some(shared) = self.writer.take() else {
            return Ok(());
        };
        let writer = match shared.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match writer {
            Some(w) => w.finish(),
            None => Ok(()),
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn configure(&mut self, spec: &CaptureSpec) -> Result<(), DeviceError> {
        self.spec = Some(spec.clone());
        Ok(())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        let spec = self.spec.clone().ok_or(DeviceError::NotConfigured)?;
        let AudioSource::Microphone { device_name } = &spec.source;

        let manager = AudioDeviceManager::new();
        let device = manager
            .resolve_input_device(device_name.as_deref())
            .ok_or(DeviceError::NoInputDevice)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .default_input_config()
            .map_err(|e| DeviceError::Stream(e.to_string()))?;
        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();
        info!(
            "input device: name={name}, channels={channels}, \
             sample_rate={sample_rate}, format={sample_format:?}"
        );

        if let Some(parent) = spec.output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = PcmWriter::create(&spec.output_path, spec.codec, sample_rate)?;
        let shared: SharedWriter = Arc::new(Mutex::new(Some(writer)));

        let config = supported.into();
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, shared.clone(), channels),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, shared.clone(), channels),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, shared.clone(), channels),
            other => Err(DeviceError::UnsupportedFormat(format!("{other:?}"))),
        };
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                // Nothing was captured; do not leave an empty clip behind.
                drop(shared);
                let _ = fs::remove_file(&spec.output_path);
                return Err(e);
            }
        };

        self.stream = Some(stream);
        self.writer = Some(shared);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        let stream = self.stream.as_ref().ok_or(DeviceError::NotPrepared)?;
        stream
            .play()
            .map_err(|e| DeviceError::Stream(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        if self.stream.is_none() && self.writer.is_none() {
            return Err(DeviceError::NotPrepared);
        }
        // Drop the stream first so no callback races the final flush.
        self.stream.take();
        self.finalize_writer()
    }

    fn release(&mut self) {
        self.stream.take();
        if let Err(e) = self.finalize_writer() {
            warn!("failed to finalize capture file on release: {e}");
        }
        self.spec = None;
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    writer: SharedWriter,
    channels: u16,
) -> Result<Stream, DeviceError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
                let mono = downmix_to_mono(&samples, channels);
                if let Ok(mut guard) = writer.lock() {
                    if let Some(w) = guard.as_mut() {
                        w.write(&mono);
                    }
                }
            },
            |err: cpal::StreamError| warn!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| DeviceError::Stream(e.to_string()))
}

/// Downmix interleaved multi-channel samples to mono by averaging channels.
fn downmix_to_mono(data: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    let ch = channels as usize;
    data.chunks_exact(ch)
        .map(|frame| {
            let sum: f32 = frame.iter().sum();
            (sum / channels as f32).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Output side of a capture: an encoder plus the file it writes to.
enum PcmWriter {
    Mp3 {
        encoder: Box<Encoder>,
        file: BufWriter<File>,
    },
    Wav(hound::WavWriter<BufWriter<File>>),
}

impl PcmWriter {
    fn create(path: &Path, codec: Codec, sample_rate: u32) -> Result<Self, DeviceError> {
        match codec {
            Codec::Lame { kbps } => {
                let encoder = build_lame_encoder(sample_rate, kbps)?;
                let file = BufWriter::new(File::create(path)?);
                Ok(PcmWriter::Mp3 {
                    encoder: Box::new(encoder),
                    file,
                })
            }
            Codec::Pcm16 => {
                let spec = hound::WavSpec {
                    channels: 1,
                    sample_rate,
                    bits_per_sample: 16,
                    sample_format: hound::SampleFormat::Int,
                };
                let writer = hound::WavWriter::create(path, spec)
                    .map_err(|e| DeviceError::Encoder(e.to_string()))?;
                Ok(PcmWriter::Wav(writer))
            }
        }
    }

    fn write(&mut self, mono: &[f32]) {
        if mono.is_empty() {
            return;
        }
        match self {
            PcmWriter::Mp3 { encoder, file } => {
                let mut buf = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(
                    mono.len(),
                ));
                match encoder.encode(MonoPcm(mono), buf.spare_capacity_mut()) {
                    Ok(size) => {
                        unsafe { buf.set_len(size) };
                        if let Err(e) = file.write_all(&buf) {
                            warn!("mp3 write error: {e}");
                        }
                    }
                    Err(e) => warn!("mp3 encode error: {e:?}"),
                }
            }
            PcmWriter::Wav(writer) => {
                for &s in mono {
                    let sample = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    if let Err(e) = writer.write_sample(sample) {
                        warn!("wav write error: {e}");
                        break;
                    }
                }
            }
        }
    }

    fn finish(self) -> Result<(), DeviceError> {
        match self {
            PcmWriter::Mp3 {
                mut encoder,
                mut file,
            } => {
                let mut buf = Vec::with_capacity(mp3lame_encoder::max_required_buffer_size(0));
                let size = encoder
                    .flush::<FlushNoGap>(buf.spare_capacity_mut())
                    .map_err(|e| DeviceError::Encoder(format!("{e:?}")))?;
                unsafe { buf.set_len(size) };
                file.write_all(&buf)?;
                file.flush()?;
                debug!("mp3 encoder flushed");
                Ok(())
            }
            PcmWriter::Wav(writer) => writer
                .finalize()
                .map_err(|e| DeviceError::Encoder(e.to_string())),
        }
    }
}

fn build_lame_encoder(sample_rate: u32, kbps: u32) -> Result<Encoder, DeviceError> {
    let mut builder = Builder::new()
        .ok_or_else(|| DeviceError::Encoder("failed to create LAME builder".into()))?;
    builder
        .set_num_channels(1)
        .map_err(|e| DeviceError::Encoder(format!("{e:?}")))?;
    builder
        .set_sample_rate(sample_rate)
        .map_err(|e| DeviceError::Encoder(format!("{e:?}")))?;
    builder
        .set_brate(lame_bitrate(kbps))
        .map_err(|e| DeviceError::Encoder(format!("{e:?}")))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| DeviceError::Encoder(format!("{e:?}")))?;
    builder
        .build()
        .map_err(|e| DeviceError::Encoder(format!("{e:?}")))
}

fn lame_bitrate(kbps: u32) -> Bitrate {
    match kbps {
        0..=64 => Bitrate::Kbps64,
        65..=96 => Bitrate::Kbps96,
        97..=128 => Bitrate::Kbps128,
        129..=160 => Bitrate::Kbps160,
        161..=192 => Bitrate::Kbps192,
        193..=256 => Bitrate::Kbps256,
        _ => Bitrate::Kbps320,
    }
}
