//! File-backed configuration for voxmemo.
//!
//! Stored as JSON in the user's config directory
//! (`~/.config/voxmemo/config.json` on Linux).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::ContainerFormat;
use crate::error::VoiceError;

const APP_DIR_NAME: &str = "voxmemo";
const CONFIG_FILE: &str = "config.json";

/// Where finished clips may be handed for upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub server_url: String,
    pub token: String,
}

impl UploadConfig {
    /// True if both server_url and token are non-empty.
    pub fn is_configured(&self) -> bool {
        !self.server_url.trim().is_empty() && !self.token.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage root for clips; the platform cache directory when unset.
    pub recordings_dir: Option<PathBuf>,
    pub input_device: Option<String>,
    pub container: ContainerFormat,
    pub upload: UploadConfig,
}

/// Default location of the config file.
pub fn config_path() -> Result<PathBuf, VoiceError> {
    let dir = dirs::config_dir()
        .ok_or_else(|| VoiceError::Config("could not determine config directory".into()))?;
    Ok(dir.join(APP_DIR_NAME).join(CONFIG_FILE))
}

/// Storage root used when none is configured.
pub fn default_recordings_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recordings")
}

/// Resolve the storage root once at startup.
pub fn resolve_recordings_dir(config: &AppConfig) -> PathBuf {
    config
        .recordings_dir
        .clone()
        .unwrap_or_else(default_recordings_dir)
}

/// Read config from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, VoiceError> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| VoiceError::Config(format!("failed to read config: {e}")))?;
    serde_json::from_str(&content)
        .map_err(|e| VoiceError::Config(format!("failed to parse config: {e}")))
}

/// Write config to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), VoiceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| VoiceError::Config(format!("failed to create config directory: {e}")))?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| VoiceError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, content).map_err(|e| VoiceError::Config(format!("failed to write config: {e}")))
}

/// Delete the config file at `path`, if any.
pub fn clear_config_at(path: &Path) -> Result<(), VoiceError> {
    if path.exists() {
        fs::remove_file(path)
            .map_err(|e| VoiceError::Config(format!("failed to delete config: {e}")))?;
    }
    Ok(())
}
