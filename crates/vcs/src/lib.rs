//! External persistence collaborators
//!
//! The backup core never touches git or restic directly. It talks to two
//! traits:
//! - [`VersionControl`]: local history (git in the vault)
//! - [`SnapshotStore`]: remote encrypted snapshots (restic)
//!
//! Lookups that miss (unknown commit, file absent from a snapshot) return
//! `Ok(None)`. Errors are reserved for tool failures.

pub mod command;
pub mod git;
pub mod restic;
pub mod restore;

pub use command::{ToolCommand, ToolError, ToolOutput};
pub use git::{parse_git_log, parse_porcelain, Git, GITIGNORE_TEMPLATE};
pub use restic::{parse_ls, parse_snapshots, Restic};
pub use restore::{
    in_place_target, vault_relative, FetchedFile, RestoreError, RestoreOrigin, RestoreService,
    RestoredFile,
};

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// How a working-tree file differs from the last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One uncommitted change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    /// Vault-relative path (the new path for renames)
    pub path: String,
    pub kind: ChangeKind,
}

/// One commit in the local history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitRecord {
    pub hash: String,
    pub short_hash: String,
    /// Author date, ISO 8601
    pub date: String,
    pub message: String,
}

/// One remote snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub id: String,
    pub short_id: String,
    /// Snapshot time, ISO 8601
    pub time: String,
    pub paths: Vec<String>,
    pub tags: Vec<String>,
}

/// One node inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub path: String,
    /// `file`, `dir` or `symlink`
    pub kind: String,
    pub size: u64,
    pub mtime: String,
}

/// Local version-control collaborator
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Uncommitted changes in the working tree (read-only)
    async fn status(&self) -> Result<Vec<FileChange>, ToolError>;

    async fn has_uncommitted_changes(&self) -> Result<bool, ToolError> {
        Ok(!self.status().await?.is_empty())
    }

    /// Stage everything and commit; returns the new commit hash
    async fn commit(&self, message: &str) -> Result<String, ToolError>;

    /// Most recent commits, newest first
    async fn log(&self, count: usize) -> Result<Vec<CommitRecord>, ToolError>;

    /// Commits touching `path`, following renames
    async fn file_history(&self, path: &str, count: usize) -> Result<Vec<CommitRecord>, ToolError>;

    /// File content at a commit, `None` if the commit or file is unknown
    async fn show(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError>;

    /// Write the file as of `commit` to `target`
    async fn restore(
        &self,
        commit: &str,
        path: &str,
        target: &Path,
    ) -> Result<Option<PathBuf>, ToolError> {
        match self.show(commit, path).await? {
            Some(content) => write_restored(target, &content).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Remote snapshot collaborator
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshot the vault working tree; returns the new snapshot ID when reported
    async fn push(&self) -> Result<Option<String>, ToolError>;

    /// Apply the configured keep-policy; returns whether one ran
    async fn apply_retention(&self) -> Result<bool, ToolError>;

    /// Snapshots, optionally filtered by tag, in store order
    async fn list_snapshots(&self, tag: Option<&str>) -> Result<Vec<Snapshot>, ToolError>;

    /// Entries of a snapshot under `prefix`, `None` if the snapshot is unknown
    async fn list_files(
        &self,
        snapshot: &str,
        prefix: Option<&str>,
    ) -> Result<Option<Vec<SnapshotEntry>>, ToolError>;

    /// File content from a snapshot, `None` if the snapshot or file is unknown
    async fn dump(&self, snapshot: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError>;

    /// Write the file from `snapshot` to `target`
    async fn restore(
        &self,
        snapshot: &str,
        path: &str,
        target: &Path,
    ) -> Result<Option<PathBuf>, ToolError> {
        match self.dump(snapshot, path).await? {
            Some(content) => write_restored(target, &content).await.map(Some),
            None => Ok(None),
        }
    }
}

/// Write restored content, creating parent directories
pub async fn write_restored(target: &Path, content: &[u8]) -> Result<PathBuf, ToolError> {
    let to_write_error = |reason: std::io::Error| ToolError::Write {
        path: target.to_path_buf(),
        reason,
    };

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(to_write_error)?;
    }
    tokio::fs::write(target, content)
        .await
        .map_err(to_write_error)?;

    Ok(target.to_path_buf())
}

/// Identifiers are passed to tools as arguments; refuse anything option-like
pub(crate) fn is_safe_revision(revision: &str) -> bool {
    !revision.is_empty() && !revision.starts_with('-') && !revision.contains(':')
}
