//! Local record store.
//!
//! Scans the storage root, derives display metadata for every clip and keeps
//! the ordered list. Every mutation rescans, so callers always see fresh
//! `Record` values and never patch one in place.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use tracing::{debug, info, warn};

use crate::error::VoiceError;
use crate::probe::{duration_display, MediaProber};

/// Display format of a record's timestamp, e.g. `21.02.2026 14:30`.
pub const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M";

/// One persisted audio clip plus its derived display metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// File name, e.g. `21_02_2026_14_30_52.mp3`.
    pub name: String,
    /// Full path; unique per record.
    pub path: PathBuf,
    /// Last modification time, used for ordering.
    pub modified_at: SystemTime,
    /// `modified_at` formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp_display: String,
    /// Encoded duration, if the prober could read it.
    pub duration: Option<Duration>,
    /// `H:MM:SS` / `MM:SS`, or a placeholder when unknown.
    pub duration_display: String,
}

/// List every file in `root`, newest first.
///
/// A missing root is an empty list. A clip whose duration cannot be probed is
/// still listed, with a placeholder duration.
pub fn list_records(root: &Path, prober: &dyn MediaProber) -> Result<Vec<Record>, VoiceError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|e| {
        VoiceError::StorageOperationFailed(format!("failed to read {}: {e}", root.display()))
    })?;

    let mut records = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("skipping unreadable directory entry: {e}");
                continue;
            }
        };
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let modified_at = metadata
            .modified()
            .or_else(|_| metadata.created())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let duration = match prober.duration(&path) {
            Ok(d) => Some(d),
            Err(e) => {
                debug!("{e}");
                None
            }
        };

        records.push(Record {
            name,
            timestamp_display: format_timestamp(modified_at),
            duration_display: duration_display(duration),
            duration,
            path,
            modified_at,
        });
    }

    records.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.name.cmp(&b.name))
    });

    Ok(records)
}

/// Format a filesystem time in local time with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(time: SystemTime) -> String {
    chrono::DateTime::<chrono::Local>::from(time)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Owns the ordered record list for one storage root.
pub struct RecordStore {
    root: PathBuf,
    prober: Box<dyn MediaProber>,
    records: Vec<Record>,
}

impl RecordStore {
    /// Create a store. The list stays empty until the first [`rescan`](Self::rescan).
    pub fn new(root: PathBuf, prober: Box<dyn MediaProber>) -> Self {
        Self {
            root,
            prober,
            records: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn rescan(&mut self) -> Result<&[Record], VoiceError> {
        self.records = list_records(&self.root, self.prober.as_ref())?;
        debug!("rescanned {}: {} records", self.root.display(), self.records.len());
        Ok(&self.records)
    }

    /// Remove a clip, then rescan. Only files inside the root can be deleted.
    pub fn delete(&mut self, path: &Path) -> Result<(), VoiceError> {
        let file = self.confine(path)?;
        fs::remove_file(&file).map_err(|e| {
            VoiceError::StorageOperationFailed(format!("failed to delete {}: {e}", file.display()))
        })?;
        info!("deleted {}", file.display());
        self.rescan()?;
        Ok(())
    }

    /// Rename a clip to `new_name` inside the root, then rescan.
    ///
    /// Fails instead of overwriting when `new_name` is taken. The renamed file
    /// is stamped with the current time. Returns the new path.
    pub fn rename(&mut self, path: &Path, new_name: &str) -> Result<PathBuf, VoiceError> {
        validate_file_name(new_name)?;
        let source = self.confine(path)?;
        let root = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let target = root.join(new_name);

        if target == source {
            self.rescan()?;
            return Ok(target);
        }
        if target.exists() {
            return Err(VoiceError::StorageOperationFailed(format!(
                "'{new_name}' already exists"
            )));
        }

        fs::rename(&source, &target).map_err(|e| {
            VoiceError::StorageOperationFailed(format!(
                "failed to rename {} to {new_name}: {e}",
                source.display()
            ))
        })?;
        if let Err(e) = filetime::set_file_mtime(&target, FileTime::now()) {
            warn!("failed to stamp {}: {e}", target.display());
        }
        info!("renamed {} -> {}", source.display(), target.display());

        self.rescan()?;
        Ok(target)
    }

    /// Resolve `path` and make sure it lives directly under the root.
    fn confine(&self, path: &Path) -> Result<PathBuf, VoiceError> {
        let root = self.root.canonicalize().map_err(|e| {
            VoiceError::StorageOperationFailed(format!("invalid storage root: {e}"))
        })?;
        let file = path
            .canonicalize()
            .map_err(|e| VoiceError::StorageOperationFailed(format!("file not found: {e}")))?;
        if file.parent() != Some(root.as_path()) {
            return Err(VoiceError::StorageOperationFailed(
                "file is outside the recordings directory".to_string(),
            ));
        }
        Ok(file)
    }
}

fn validate_file_name(name: &str) -> Result<(), VoiceError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(VoiceError::StorageOperationFailed(format!(
            "invalid file name: '{name}'"
        )));
    }
    Ok(())
}
