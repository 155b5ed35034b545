//! Session controller: the single writer of recording/playback state.
//!
//! Every externally triggered action goes through here so the record list,
//! the two sessions and the shared timer change together. Recording and
//! playback are mutually exclusive; only one clip plays at a time.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::device::AudioBackend;
use crate::error::VoiceError;
use crate::playback::{PlaybackSession, PlaybackState};
use crate::probe::MediaProber;
use crate::recorder::{RecorderConfig, RecorderState, RecordingSession};
use crate::recordings::{Record, RecordStore};
use crate::timer::{SessionTimer, TimerEvent};

/// A record together with its per-record session state.
///
/// Entries are rebuilt from scratch on every rescan, so the flags can never
/// drift out of step with the record they describe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub record: Record,
    pub playback: PlaybackState,
    pub rename_dialog_open: bool,
}

impl RecordEntry {
    pub fn is_playing(&self) -> bool {
        self.playback == PlaybackState::Playing
    }
}

/// What a toggle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    RecordingStarted(PathBuf),
    RecordingStopped(PathBuf),
    PlaybackStarted(PathBuf),
    PlaybackStopped(PathBuf),
    /// Another clip was stopped before this one started.
    PlaybackSwitched { from: PathBuf, to: PathBuf },
    /// The guard refused the call; nothing changed.
    Ignored(VoiceError),
}

/// What a timer tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Elapsed(u64),
    /// The playing clip reached its end and was stopped.
    PlaybackFinished(PathBuf),
    /// The safety cutoff fired; both sessions were stopped.
    TimedOut { elapsed: u64 },
}

pub struct SessionController {
    backend: Box<dyn AudioBackend>,
    store: RecordStore,
    recording: RecordingSession,
    playback: PlaybackSession,
    timer: SessionTimer,
    entries: Vec<RecordEntry>,
}

impl SessionController {
    /// Build a controller over `config.output_dir` and scan it once.
    pub fn new(
        config: RecorderConfig,
        backend: Box<dyn AudioBackend>,
        prober: Box<dyn MediaProber>,
    ) -> Result<Self, VoiceError> {
        let store = RecordStore::new(config.output_dir.clone(), prober);
        let mut controller = Self {
            backend,
            store,
            recording: RecordingSession::new(config),
            playback: PlaybackSession::new(),
            timer: SessionTimer::default(),
            entries: Vec::new(),
        };
        controller.refresh()?;
        Ok(controller)
    }

    /// Replace the timer, e.g. with a shorter cutoff.
    pub fn with_timer(mut self, timer: SessionTimer) -> Self {
        self.timer = timer;
        self
    }

    pub fn entries(&self) -> &[RecordEntry] {
        &self.entries
    }

    pub fn path_at(&self, index: usize) -> Result<PathBuf, VoiceError> {
        self.entries
            .get(index)
            .map(|e| e.record.path.clone())
            .ok_or(VoiceError::NoSuchRecord(index))
    }

    pub fn is_recording(&self) -> bool {
        self.recording.state() == RecorderState::Recording
    }

    pub fn playing_index(&self) -> Option<usize> {
        self.entries.iter().position(RecordEntry::is_playing)
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.timer.elapsed()
    }

    pub fn storage_root(&self) -> &Path {
        self.store.root()
    }

    /// Rescan storage and rebuild all entries.
    pub fn refresh(&mut self) -> Result<(), VoiceError> {
        let result = self.store.rescan().map(|_| ());
        self.rebuild_entries();
        result
    }

    /// Start a recording, or stop the one in progress. Ignored while a clip
    /// is playing.
    pub fn toggle_record(&mut self) -> Result<Transition, VoiceError> {
        if self.playback.is_playing() {
            debug!("record toggle ignored: playback active");
            return Ok(Transition::Ignored(VoiceError::PlaybackActive));
        }

        match self.recording.state() {
            RecorderState::Idle => {
                let path = self
                    .recording
                    .start(self.backend.as_ref(), &mut self.timer)?;
                Ok(Transition::RecordingStarted(path))
            }
            RecorderState::Recording => {
                let stopped = self.recording.stop(&mut self.timer);
                let refreshed = self.refresh();
                let path = stopped?;
                refreshed?;
                Ok(Transition::RecordingStopped(path))
            }
        }
    }

    /// Play the record at `index`, stop it if it is the one playing, or switch
    /// to it from another playing record. Ignored while recording.
    pub fn toggle_or_switch_play(&mut self, index: usize) -> Result<Transition, VoiceError> {
        if self.is_recording() {
            debug!("play toggle ignored: recording active");
            return Ok(Transition::Ignored(VoiceError::RecordingActive));
        }
        let path = self.path_at(index)?;

        let result = match self.playback.playing().map(Path::to_path_buf) {
            Some(current) if current == path => self
                .playback
                .stop(&mut self.timer)
                .map(Transition::PlaybackStopped),
            Some(current) => {
                self.playback.stop(&mut self.timer)?;
                self.sync_playback_flags();
                self.playback
                    .start(&path, self.backend.as_ref(), &mut self.timer)
                    .map(|_| Transition::PlaybackSwitched {
                        from: current,
                        to: path,
                    })
            }
            None => self
                .playback
                .start(&path, self.backend.as_ref(), &mut self.timer)
                .map(|_| Transition::PlaybackStarted(path)),
        };
        self.sync_playback_flags();
        result
    }

    /// Delete a clip and rescan. A clip that is playing is stopped first; the
    /// clip being recorded cannot be deleted.
    pub fn delete(&mut self, path: &Path) -> Result<(), VoiceError> {
        self.reject_if_recording(path)?;
        self.stop_playback_of(path);
        let result = self.store.delete(path);
        self.rebuild_entries();
        result
    }

    pub fn open_rename_dialog(&mut self, index: usize) -> Result<(), VoiceError> {
        self.set_rename_dialog(index, true)
    }

    pub fn dismiss_rename_dialog(&mut self, index: usize) -> Result<(), VoiceError> {
        self.set_rename_dialog(index, false)
    }

    /// Rename the record at `index` and close its dialog. Fails without
    /// touching storage when `new_name` is taken or not a plain file name.
    ///
    /// The dialog for `index` must still be open: a rescan closes every
    /// dialog, and after one the index may point at a different clip.
    pub fn rename(&mut self, index: usize, new_name: &str) -> Result<PathBuf, VoiceError> {
        let path = self.path_at(index)?;
        if !self.entries[index].rename_dialog_open {
            return Err(VoiceError::RenameDialogClosed(index));
        }
        self.reject_if_recording(&path)?;
        self.set_rename_dialog(index, false)?;
        self.stop_playback_of(&path);
        let result = self.store.rename(&path, new_name);
        if result.is_ok() {
            self.rebuild_entries();
        }
        result
    }

    /// Advance the shared timer by one period.
    ///
    /// Also stops a clip that has played out, and force-stops both sessions
    /// when the timer reaches its cutoff.
    pub fn tick(&mut self) -> TickOutcome {
        if self.playback.is_finished() {
            if let Ok(path) = self.playback.stop(&mut self.timer) {
                self.sync_playback_flags();
                return TickOutcome::PlaybackFinished(path);
            }
        }

        match self.timer.tick() {
            TimerEvent::Idle => TickOutcome::Idle,
            TimerEvent::Tick { elapsed } => TickOutcome::Elapsed(elapsed),
            TimerEvent::Expired { elapsed } => {
                warn!("session reached the {elapsed}s limit, stopping");
                self.stop_all();
                TickOutcome::TimedOut { elapsed }
            }
        }
    }

    /// Stop everything and release both devices. A recording in progress is
    /// finalized so the clip stays playable.
    pub fn shutdown(&mut self) {
        self.stop_all();
        info!("session controller shut down");
    }

    fn stop_all(&mut self) {
        if self.playback.is_playing() {
            if let Err(e) = self.playback.stop(&mut self.timer) {
                warn!("failed to stop playback: {e}");
            }
        }
        if self.is_recording() {
            if let Err(e) = self.recording.stop(&mut self.timer) {
                warn!("failed to stop recording: {e}");
            }
            if let Err(e) = self.store.rescan() {
                warn!("rescan after stop failed: {e}");
            }
            self.rebuild_entries();
        } else {
            self.sync_playback_flags();
        }
    }

    fn reject_if_recording(&self, path: &Path) -> Result<(), VoiceError> {
        if self.recording.current_file() == Some(path) {
            debug!("{} is being recorded", path.display());
            return Err(VoiceError::RecordingActive);
        }
        Ok(())
    }

    fn stop_playback_of(&mut self, path: &Path) {
        if self.playback.playing() == Some(path) {
            if let Err(e) = self.playback.stop(&mut self.timer) {
                warn!("failed to stop playback: {e}");
            }
            self.sync_playback_flags();
        }
    }

    fn set_rename_dialog(&mut self, index: usize, open: bool) -> Result<(), VoiceError> {
        let entry = self
            .entries
            .get_mut(index)
            .ok_or(VoiceError::NoSuchRecord(index))?;
        entry.rename_dialog_open = open;
        Ok(())
    }

    /// The clip still being written is left out until its recording stops.
    fn rebuild_entries(&mut self) {
        let playback = &self.playback;
        let in_progress = self.recording.current_file();
        self.entries = self
            .store
            .records()
            .iter()
            .filter(|record| Some(record.path.as_path()) != in_progress)
            .map(|record| RecordEntry {
                playback: playback.state_of(&record.path),
                rename_dialog_open: false,
                record: record.clone(),
            })
            .collect();
    }

    fn sync_playback_flags(&mut self) {
        for entry in &mut self.entries {
            entry.playback = self.playback.state_of(&entry.record.path);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop_all();
    }
}
