//! Durable backup state markers
//!
//! The State Store keeps four scalar markers under the state directory,
//! each in its own plain-text file so they survive process restarts:
//! ```text
//! <state_dir>/
//!   last_commit       unix milliseconds of the last successful local commit
//!   last_backup       unix milliseconds of the last successful remote snapshot
//!   last_change       unix milliseconds of the most recent vault event
//!   pending_changes   "true" while observed changes are not yet committed
//! ```
//!
//! A zero timestamp means "never". Each marker is replaced atomically.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

const LAST_COMMIT: &str = "last_commit";
const LAST_BACKUP: &str = "last_backup";
const LAST_CHANGE: &str = "last_change";
const PENDING_CHANGES: &str = "pending_changes";

const DEFAULT_MARKERS: [(&str, &str); 4] = [
    (LAST_COMMIT, "0"),
    (LAST_BACKUP, "0"),
    (LAST_CHANGE, "0"),
    (PENDING_CHANGES, "false"),
];

/// Errors raised while reading or writing state markers
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read state marker {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write state marker {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Snapshot of the persisted backup state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeState {
    /// Most recent observed filesystem event
    pub last_change_at: Option<DateTime<Utc>>,
    /// True between "change observed" and "change committed and backed up"
    pub pending: bool,
    /// Last successful local commit
    pub last_commit_at: Option<DateTime<Utc>>,
    /// Last successful remote snapshot
    pub last_backup_at: Option<DateTime<Utc>>,
}

impl ChangeState {
    /// Whether the remote snapshot is older than `max_age` (never backed up counts as stale)
    pub fn backup_is_stale(&self, now: DateTime<Utc>, max_age: std::time::Duration) -> bool {
        match self.last_backup_at {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= max_age,
                // Clock went backwards; treat as fresh
                Err(_) => false,
            },
        }
    }
}

/// Durable key-value markers for the backup pipeline
///
/// Field ownership: the watcher writes `last_change` and sets `pending`;
/// the orchestrator writes `last_commit`, `last_backup` and clears `pending`.
/// The internal mutex only serializes the file writes of those two roles.
pub struct StateStore {
    dir: PathBuf,
    state: Mutex<ChangeState>,
}

impl StateStore {
    /// Open the store, creating the directory and default markers as needed
    pub fn open(dir: &Path) -> Result<Self, StateError> {
        fs::create_dir_all(dir).map_err(|source| StateError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        for (name, default) in DEFAULT_MARKERS {
            if !dir.join(name).exists() {
                write_marker(dir, name, default)?;
            }
        }

        Self::load(dir)
    }

    /// Load the markers without creating anything on disk
    ///
    /// Missing markers read as their defaults.
    pub fn load(dir: &Path) -> Result<Self, StateError> {
        let state = ChangeState {
            last_change_at: read_time(dir, LAST_CHANGE)?,
            pending: read_flag(dir, PENDING_CHANGES)?,
            last_commit_at: read_time(dir, LAST_COMMIT)?,
            last_backup_at: read_time(dir, LAST_BACKUP)?,
        };

        Ok(Self {
            dir: dir.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// State directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current in-memory view of the markers
    pub fn snapshot(&self) -> ChangeState {
        self.state.lock().clone()
    }

    /// Record an observed vault change (watcher role)
    pub fn record_change(&self, at: DateTime<Utc>) -> Result<(), StateError> {
        let mut state = self.state.lock();
        let latest = state.last_change_at.map_or(at, |prev| prev.max(at));

        write_marker(&self.dir, LAST_CHANGE, &encode_time(Some(latest)))?;
        if !state.pending {
            write_marker(&self.dir, PENDING_CHANGES, "true")?;
        }

        state.last_change_at = Some(latest);
        state.pending = true;
        Ok(())
    }

    /// Record a successful local commit (orchestrator role)
    pub fn record_commit(&self, at: DateTime<Utc>) -> Result<(), StateError> {
        let mut state = self.state.lock();
        write_marker(&self.dir, LAST_COMMIT, &encode_time(Some(at)))?;
        state.last_commit_at = Some(at);
        Ok(())
    }

    /// Record a successful remote snapshot (orchestrator role)
    pub fn record_backup(&self, at: DateTime<Utc>) -> Result<(), StateError> {
        let mut state = self.state.lock();
        write_marker(&self.dir, LAST_BACKUP, &encode_time(Some(at)))?;
        state.last_backup_at = Some(at);
        Ok(())
    }

    /// Force `pending` on after a failed cycle so the next trigger retries
    pub fn mark_pending(&self) -> Result<(), StateError> {
        let mut state = self.state.lock();
        if !state.pending {
            write_marker(&self.dir, PENDING_CHANGES, "true")?;
            state.pending = true;
        }
        Ok(())
    }

    /// Clear `pending` unless a change was observed after `cycle_start`
    ///
    /// Returns whether the flag was cleared. Changes that arrive while a
    /// cycle runs keep `pending` set so the next trigger picks them up.
    pub fn clear_pending_if_quiet_since(&self, cycle_start: DateTime<Utc>) -> Result<bool, StateError> {
        let mut state = self.state.lock();
        if state.last_change_at.is_some_and(|changed| changed > cycle_start) {
            return Ok(false);
        }

        if state.pending {
            write_marker(&self.dir, PENDING_CHANGES, "false")?;
            state.pending = false;
        }
        Ok(true)
    }
}

fn encode_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or(0, |t| t.timestamp_millis()).to_string()
}

fn decode_time(raw: &str) -> Option<Option<DateTime<Utc>>> {
    let millis: i64 = raw.trim().parse().ok()?;
    if millis == 0 {
        return Some(None);
    }
    Utc.timestamp_millis_opt(millis).single().map(Some)
}

fn read_marker(dir: &Path, name: &str) -> Result<Option<String>, StateError> {
    let path = dir.join(name);
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StateError::Read { path, source }),
    }
}

fn read_time(dir: &Path, name: &str) -> Result<Option<DateTime<Utc>>, StateError> {
    let Some(raw) = read_marker(dir, name)? else {
        return Ok(None);
    };

    match decode_time(&raw) {
        Some(at) => Ok(at),
        None => {
            warn!(marker = name, value = %raw.trim(), "Malformed state marker, using default");
            Ok(None)
        }
    }
}

fn read_flag(dir: &Path, name: &str) -> Result<bool, StateError> {
    let Some(raw) = read_marker(dir, name)? else {
        return Ok(false);
    };

    match raw.trim() {
        "true" => Ok(true),
        "false" | "" => Ok(false),
        other => {
            warn!(marker = name, value = other, "Malformed state marker, using default");
            Ok(false)
        }
    }
}

/// Atomic write helper
///
/// Writes to a temporary file in the same directory, fsyncs it, then renames
/// it over the marker so readers never observe a torn value.
fn write_marker(dir: &Path, name: &str, value: &str) -> Result<(), StateError> {
    let path = dir.join(name);
    let to_write_error = |source: io::Error| StateError::Write {
        path: path.clone(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(dir).map_err(to_write_error)?;
    tmp.write_all(value.as_bytes()).map_err(to_write_error)?;
    tmp.as_file().sync_all().map_err(to_write_error)?;
    tmp.persist(&path).map_err(|e| to_write_error(e.error))?;
    Ok(())
}
