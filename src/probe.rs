//! Clip duration probing and elapsed-time formatting.

use std::path::Path;
use std::time::Duration;

use crate::error::VoiceError;

/// Shown in place of a duration the prober could not extract.
pub const UNKNOWN_DURATION: &str = "--:--";

/// Reads the encoded duration of a media file.
pub trait MediaProber {
    fn duration(&self, path: &Path) -> Result<Duration, VoiceError>;
}

/// Prober reading container headers directly: WAV via hound, MP3 by
/// scanning frame headers.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProber;

impl MediaProber for FileProber {
    fn duration(&self, path: &Path) -> Result<Duration, VoiceError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "wav" => wav_duration(path),
            "mp3" => mp3_duration::from_path(path)
                .map_err(|e| VoiceError::DurationUnknown(format!("{}: {e}", path.display()))),
            _ => Err(VoiceError::DurationUnknown(format!(
                "{}: unsupported container .{ext}",
                path.display()
            ))),
        }
    }
}

fn wav_duration(path: &Path) -> Result<Duration, VoiceError> {
    let reader = hound::WavReader::open(path)
        .map_err(|e| VoiceError::DurationUnknown(format!("{}: {e}", path.display())))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(VoiceError::DurationUnknown(format!(
            "{}: zero sample rate",
            path.display()
        )));
    }
    // hound reports frames, not interleaved samples.
    Ok(Duration::from_secs_f64(
        reader.duration() as f64 / spec.sample_rate as f64,
    ))
}

/// Format whole seconds as `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_elapsed(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Display string for a probe result; failures degrade to [`UNKNOWN_DURATION`].
pub fn duration_display(duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format_elapsed(d.as_secs_f64().round() as u64),
        None => UNKNOWN_DURATION.to_string(),
    }
}
