//! In-memory history for HTTP and command tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use vault_backup_core::Notifier;
use vault_core::{Settings, StateStore};
use vault_vcs::{
    CommitRecord, FileChange, Snapshot, SnapshotEntry, SnapshotStore, ToolError, VersionControl,
};

use crate::context::AppContext;

/// Git commits and restic snapshots keyed by (id, path)
///
/// Commit paths are vault-relative; snapshot paths are absolute, as the real
/// tools report them.
#[derive(Default)]
pub struct FakeHistory {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    commits: Mutex<Vec<CommitRecord>>,
    snapshots: Mutex<Vec<Snapshot>>,
    fail_listing: AtomicBool,
}

impl FakeHistory {
    pub fn add_commit(&self, hash: &str, path: &str, content: &[u8]) {
        self.files
            .lock()
            .insert((hash.to_string(), path.to_string()), content.to_vec());
        self.commits.lock().insert(
            0,
            CommitRecord {
                hash: hash.to_string(),
                short_hash: hash.chars().take(7).collect(),
                date: "2024-01-01T10:00:00+00:00".to_string(),
                message: format!("vault backup: update {}", path),
            },
        );
    }

    pub fn add_snapshot(&self, id: &str, path: &str, content: &[u8]) {
        self.files
            .lock()
            .insert((id.to_string(), path.to_string()), content.to_vec());
        self.snapshots.lock().push(Snapshot {
            id: id.to_string(),
            short_id: id.chars().take(8).collect(),
            time: "2024-01-01T10:00:00Z".to_string(),
            paths: vec!["/vault".to_string()],
            tags: vec!["obsidian".to_string()],
        });
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    fn lookup(&self, id: &str, path: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .get(&(id.to_string(), path.to_string()))
            .cloned()
    }
}

#[async_trait]
impl VersionControl for FakeHistory {
    async fn status(&self) -> Result<Vec<FileChange>, ToolError> {
        Ok(Vec::new())
    }

    async fn commit(&self, _message: &str) -> Result<String, ToolError> {
        Ok("f".repeat(40))
    }

    async fn log(&self, count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        Ok(self.commits.lock().iter().take(count).cloned().collect())
    }

    async fn file_history(&self, path: &str, count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        let files = self.files.lock();
        Ok(self
            .commits
            .lock()
            .iter()
            .filter(|c| files.contains_key(&(c.hash.clone(), path.to_string())))
            .take(count)
            .cloned()
            .collect())
    }

    async fn show(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        Ok(self.lookup(commit, path))
    }
}

#[async_trait]
impl SnapshotStore for FakeHistory {
    async fn push(&self) -> Result<Option<String>, ToolError> {
        Ok(Some("0123abcd".to_string()))
    }

    async fn apply_retention(&self) -> Result<bool, ToolError> {
        Ok(false)
    }

    async fn list_snapshots(&self, tag: Option<&str>) -> Result<Vec<Snapshot>, ToolError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ToolError::Failed {
                command: "restic snapshots".to_string(),
                code: 1,
                stderr: "Fatal: unable to open repository".to_string(),
            });
        }
        Ok(self
            .snapshots
            .lock()
            .iter()
            .filter(|s| tag.map_or(true, |t| s.tags.iter().any(|st| st == t)))
            .cloned()
            .collect())
    }

    async fn list_files(
        &self,
        snapshot: &str,
        prefix: Option<&str>,
    ) -> Result<Option<Vec<SnapshotEntry>>, ToolError> {
        if !self.snapshots.lock().iter().any(|s| s.id == snapshot) {
            return Ok(None);
        }
        let entries = self
            .files
            .lock()
            .iter()
            .filter(|((id, path), _)| {
                id == snapshot && prefix.map_or(true, |p| path.starts_with(p))
            })
            .map(|((_, path), content)| SnapshotEntry {
                path: path.clone(),
                kind: "file".to_string(),
                size: content.len() as u64,
                mtime: "2024-01-01T09:00:00Z".to_string(),
            })
            .collect();
        Ok(Some(entries))
    }

    async fn dump(&self, snapshot: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        Ok(self.lookup(snapshot, path))
    }
}

/// Context over a temp vault and the fake history
pub struct TestContext {
    pub vault: TempDir,
    _state_dir: TempDir,
    pub history: Arc<FakeHistory>,
    pub ctx: Arc<AppContext>,
}

pub fn test_context() -> TestContext {
    let vault = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();
    let history = Arc::new(FakeHistory::default());

    let settings = Settings {
        vault_path: vault.path().to_path_buf(),
        state_dir: state_dir.path().to_path_buf(),
        ..Settings::default()
    };
    let state = Arc::new(StateStore::open(state_dir.path()).unwrap());

    let ctx = AppContext::new(
        settings,
        state,
        history.clone(),
        history.clone(),
        Notifier::disabled(),
        None,
    );

    TestContext {
        vault,
        _state_dir: state_dir,
        history,
        ctx: Arc::new(ctx),
    }
}

impl TestContext {
    /// Absolute snapshot path of a vault-relative file
    pub fn snapshot_path(&self, relative: &str) -> String {
        self.vault
            .path()
            .join(relative)
            .to_string_lossy()
            .into_owned()
    }
}
