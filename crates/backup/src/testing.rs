//! In-memory collaborators for orchestrator and guard tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use vault_core::StateStore;
use vault_vcs::{CommitRecord, FileChange, Snapshot, SnapshotEntry, SnapshotStore, ToolError, VersionControl};

fn failed(command: &str) -> ToolError {
    ToolError::Failed {
        command: command.to_string(),
        code: 128,
        stderr: "fatal: simulated failure".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeVcs {
    changes: Mutex<Vec<FileChange>>,
    commits: Mutex<Vec<String>>,
    fail_commit: AtomicBool,
    fail_status: AtomicBool,
}

impl FakeVcs {
    pub fn set_changes(&self, changes: Vec<FileChange>) {
        *self.changes.lock() = changes;
    }

    pub fn fail_commits(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }

    pub fn fail_status(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    pub fn commit_messages(&self) -> Vec<String> {
        self.commits.lock().clone()
    }
}

#[async_trait]
impl VersionControl for FakeVcs {
    async fn status(&self) -> Result<Vec<FileChange>, ToolError> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(failed("git status"));
        }
        Ok(self.changes.lock().clone())
    }

    async fn commit(&self, message: &str) -> Result<String, ToolError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(failed("git commit"));
        }
        self.changes.lock().clear();
        let mut commits = self.commits.lock();
        commits.push(message.to_string());
        Ok(format!("{:040x}", commits.len()))
    }

    async fn log(&self, _count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        Ok(Vec::new())
    }

    async fn file_history(&self, _path: &str, _count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        Ok(Vec::new())
    }

    async fn show(&self, _commit: &str, _path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        Ok(None)
    }
}

#[derive(Default)]
pub(crate) struct FakeStore {
    pushes: AtomicUsize,
    fail_push: AtomicBool,
    unavailable: AtomicBool,
    fail_retention: AtomicBool,
    change_on_push: Mutex<Option<Arc<StateStore>>>,
    gate: Mutex<Option<Arc<Notify>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeStore {
    pub fn fail_pushes(&self) {
        self.fail_push.store(true, Ordering::SeqCst);
    }

    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn fail_retention(&self) {
        self.fail_retention.store(true, Ordering::SeqCst);
    }

    /// Record a vault change while the push is in progress
    pub fn record_change_on_push(&self, state: Arc<StateStore>) {
        *self.change_on_push.lock() = Some(state);
    }

    /// Hold every push until the returned gate is notified
    pub fn gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    /// Highest number of pushes observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for FakeStore {
    async fn push(&self) -> Result<Option<String>, ToolError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.change_on_push.lock().clone();
        if let Some(state) = state {
            state
                .record_change(Utc::now() + chrono::Duration::milliseconds(5))
                .map_err(|e| ToolError::Parse {
                    program: "restic",
                    reason: e.to_string(),
                })?;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ToolError::Unavailable {
                program: "restic",
                reason: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(failed("restic backup"));
        }

        let count = self.pushes.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(format!("snap{:04}", count)))
    }

    async fn apply_retention(&self) -> Result<bool, ToolError> {
        if self.fail_retention.load(Ordering::SeqCst) {
            return Err(failed("restic forget"));
        }
        Ok(false)
    }

    async fn list_snapshots(&self, _tag: Option<&str>) -> Result<Vec<Snapshot>, ToolError> {
        Ok(Vec::new())
    }

    async fn list_files(
        &self,
        _snapshot: &str,
        _prefix: Option<&str>,
    ) -> Result<Option<Vec<SnapshotEntry>>, ToolError> {
        Ok(None)
    }

    async fn dump(&self, _snapshot: &str, _path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        Ok(None)
    }
}
