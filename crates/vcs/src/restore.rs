//! Restore browsing over both history sources
//!
//! Users name a version by identifier only. The identifier's shape decides
//! which system is asked (see [`vault_core::classify_source`]); ambiguous
//! 8-character hex IDs go to git first and fall back to restic only when git
//! does not know them.
//!
//! Paths may be given vault-relative (`notes/a.md`, as git reports them) or
//! snapshot-absolute (`/vault/notes/a.md`, as restic reports them).

use crate::{SnapshotStore, ToolError, VersionControl};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use vault_core::{classify_source, normalize_path, PathError, SourceKind};

/// Restore failures
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("invalid source identifier: {0:?}")]
    InvalidSource(String),

    #[error("'{path}' not found in {id}")]
    NotFound { id: String, path: String },

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Which system a file was recovered from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreOrigin {
    Git,
    Restic,
}

impl RestoreOrigin {
    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            RestoreOrigin::Git => "git commit",
            RestoreOrigin::Restic => "restic snapshot",
        }
    }
}

/// File content retrieved from history
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub origin: RestoreOrigin,
    pub source: String,
    /// Vault-relative path
    pub path: PathBuf,
    pub content: Vec<u8>,
}

/// A file written back from history
#[derive(Debug, Clone, Serialize)]
pub struct RestoredFile {
    pub origin: RestoreOrigin,
    pub source: String,
    pub path: PathBuf,
    pub target: PathBuf,
}

/// Map a user-supplied path onto a normalized vault-relative path
///
/// Absolute paths must lie under the vault root.
pub fn vault_relative(vault: &Path, path: &str) -> Result<PathBuf, PathError> {
    let candidate = Path::new(path);
    let relative = if candidate.is_absolute() {
        candidate
            .strip_prefix(vault)
            .map_err(|_| PathError::Absolute(path.to_string()))?
    } else {
        candidate
    };
    normalize_path(relative)
}

/// Where an in-place restore of `path` writes
pub fn in_place_target(vault: &Path, path: &str) -> Result<PathBuf, PathError> {
    Ok(vault.join(vault_relative(vault, path)?))
}

/// Resolved lookup keys for both systems
struct Lookup {
    relative: PathBuf,
    git_path: String,
    snapshot_path: String,
}

/// Restore browsing over git and restic
pub struct RestoreService {
    vault: PathBuf,
    git: Arc<dyn VersionControl>,
    restic: Arc<dyn SnapshotStore>,
}

impl RestoreService {
    pub fn new(vault: &Path, git: Arc<dyn VersionControl>, restic: Arc<dyn SnapshotStore>) -> Self {
        Self {
            vault: vault.to_path_buf(),
            git,
            restic,
        }
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn git(&self) -> &Arc<dyn VersionControl> {
        &self.git
    }

    pub fn restic(&self) -> &Arc<dyn SnapshotStore> {
        &self.restic
    }

    fn lookup(&self, source: &str, path: &str) -> Result<Lookup, RestoreError> {
        if source.is_empty() || source.starts_with('-') {
            return Err(RestoreError::InvalidSource(source.to_string()));
        }

        let relative = vault_relative(&self.vault, path)?;
        Ok(Lookup {
            git_path: relative.to_string_lossy().into_owned(),
            snapshot_path: self.vault.join(&relative).to_string_lossy().into_owned(),
            relative,
        })
    }

    fn not_found(source: &str, path: &str) -> RestoreError {
        RestoreError::NotFound {
            id: source.to_string(),
            path: path.to_string(),
        }
    }

    /// Fetch file content as of `source`
    pub async fn fetch(&self, source: &str, path: &str) -> Result<FetchedFile, RestoreError> {
        let lookup = self.lookup(source, path)?;
        let kind = classify_source(source);
        debug!(source, path, kind = ?kind, "Fetching historical file");

        let found = match kind {
            SourceKind::VersionControl => self
                .git
                .show(source, &lookup.git_path)
                .await?
                .map(|content| (RestoreOrigin::Git, content)),
            SourceKind::Snapshot => self
                .restic
                .dump(source, &lookup.snapshot_path)
                .await?
                .map(|content| (RestoreOrigin::Restic, content)),
            SourceKind::Ambiguous => match self.git.show(source, &lookup.git_path).await? {
                Some(content) => Some((RestoreOrigin::Git, content)),
                None => self
                    .restic
                    .dump(source, &lookup.snapshot_path)
                    .await?
                    .map(|content| (RestoreOrigin::Restic, content)),
            },
        };

        let (origin, content) = found.ok_or_else(|| Self::not_found(source, path))?;
        Ok(FetchedFile {
            origin,
            source: source.to_string(),
            path: lookup.relative,
            content,
        })
    }

    /// Restore a file as of `source`
    ///
    /// Writes to `target`, or over the live vault file when `target` is `None`.
    pub async fn restore(
        &self,
        source: &str,
        path: &str,
        target: Option<&Path>,
    ) -> Result<RestoredFile, RestoreError> {
        let lookup = self.lookup(source, path)?;
        let target = match target {
            Some(target) => target.to_path_buf(),
            None => self.vault.join(&lookup.relative),
        };

        let origin = match classify_source(source) {
            SourceKind::VersionControl => self
                .git
                .restore(source, &lookup.git_path, &target)
                .await?
                .map(|_| RestoreOrigin::Git),
            SourceKind::Snapshot => self
                .restic
                .restore(source, &lookup.snapshot_path, &target)
                .await?
                .map(|_| RestoreOrigin::Restic),
            SourceKind::Ambiguous => {
                match self.git.restore(source, &lookup.git_path, &target).await? {
                    Some(_) => Some(RestoreOrigin::Git),
                    None => self
                        .restic
                        .restore(source, &lookup.snapshot_path, &target)
                        .await?
                        .map(|_| RestoreOrigin::Restic),
                }
            }
        };

        let origin = origin.ok_or_else(|| Self::not_found(source, path))?;
        info!(
            source,
            path = %lookup.relative.display(),
            target = %target.display(),
            origin = origin.label(),
            "File restored"
        );

        Ok(RestoredFile {
            origin,
            source: source.to_string(),
            path: lookup.relative,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChangeKind, CommitRecord, FileChange, Git, Snapshot, SnapshotEntry};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory history keyed by (identifier, path)
    #[derive(Default)]
    struct FakeHistory {
        files: HashMap<(String, String), Vec<u8>>,
        lookups: Mutex<Vec<String>>,
    }

    impl FakeHistory {
        fn with(mut self, id: &str, path: &str, content: &str) -> Self {
            self.files
                .insert((id.to_string(), path.to_string()), content.as_bytes().to_vec());
            self
        }

        fn get(&self, id: &str, path: &str) -> Option<Vec<u8>> {
            self.lookups.lock().unwrap().push(id.to_string());
            self.files.get(&(id.to_string(), path.to_string())).cloned()
        }

        fn lookup_count(&self) -> usize {
            self.lookups.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl VersionControl for FakeHistory {
        async fn status(&self) -> Result<Vec<FileChange>, ToolError> {
            Ok(vec![FileChange {
                path: "x".into(),
                kind: ChangeKind::Modified,
            }])
        }
        async fn commit(&self, _message: &str) -> Result<String, ToolError> {
            Ok("0".repeat(40))
        }
        async fn log(&self, _count: usize) -> Result<Vec<CommitRecord>, ToolError> {
            Ok(Vec::new())
        }
        async fn file_history(&self, _path: &str, _count: usize) -> Result<Vec<CommitRecord>, ToolError> {
            Ok(Vec::new())
        }
        async fn show(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
            Ok(self.get(commit, path))
        }
    }

    #[async_trait]
    impl SnapshotStore for FakeHistory {
        async fn push(&self) -> Result<Option<String>, ToolError> {
            Ok(None)
        }
        async fn apply_retention(&self) -> Result<bool, ToolError> {
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
        async fn dump(&self, snapshot: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
            Ok(self.get(snapshot, path))
        }
    }

    fn service(vault: &Path, git: FakeHistory, restic: FakeHistory) -> (RestoreService, Arc<FakeHistory>, Arc<FakeHistory>) {
        let git = Arc::new(git);
        let restic = Arc::new(restic);
        let service = RestoreService::new(vault, git.clone(), restic.clone());
        (service, git, restic)
    }

    #[test]
    fn test_vault_relative() {
        let vault = Path::new("/vault");
        assert_eq!(
            vault_relative(vault, "notes/a.md").unwrap(),
            PathBuf::from("notes/a.md")
        );
        assert_eq!(
            vault_relative(vault, "/vault/notes/a.md").unwrap(),
            PathBuf::from("notes/a.md")
        );
        assert!(matches!(
            vault_relative(vault, "/etc/passwd"),
            Err(PathError::Absolute(_))
        ));
        assert!(matches!(
            vault_relative(vault, "../secrets"),
            Err(PathError::Traversal(_))
        ));
        assert_eq!(
            in_place_target(vault, "./notes/a.md").unwrap(),
            PathBuf::from("/vault/notes/a.md")
        );
    }

    #[tokio::test]
    async fn test_ambiguous_identifier_prefers_git() {
        let git = FakeHistory::default().with("abcdef12", "notes/a.md", "from git");
        let restic = FakeHistory::default().with("abcdef12", "/vault/notes/a.md", "from restic");
        let (service, _, restic) = service(Path::new("/vault"), git, restic);

        let fetched = service.fetch("abcdef12", "notes/a.md").await.unwrap();

        assert_eq!(fetched.origin, RestoreOrigin::Git);
        assert_eq!(fetched.origin.label(), "git commit");
        assert_eq!(fetched.content, b"from git");
        assert_eq!(restic.lookup_count(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_identifier_falls_back_to_restic() {
        let git = FakeHistory::default();
        let restic = FakeHistory::default().with("abcdef12", "/vault/notes/a.md", "from restic");
        let (service, git, _) = service(Path::new("/vault"), git, restic);

        let fetched = service.fetch("abcdef12", "/vault/notes/a.md").await.unwrap();

        assert_eq!(fetched.origin, RestoreOrigin::Restic);
        assert_eq!(fetched.origin.label(), "restic snapshot");
        assert_eq!(fetched.path, PathBuf::from("notes/a.md"));
        assert_eq!(git.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_definite_identifiers_ask_one_system() {
        let hash = "a".repeat(40);
        let git = FakeHistory::default().with(&hash, "a.md", "v1");
        let restic = FakeHistory::default().with("latest", "/vault/a.md", "v2");
        let (service, git, restic) = service(Path::new("/vault"), git, restic);

        assert_eq!(service.fetch(&hash, "a.md").await.unwrap().content, b"v1");
        assert_eq!(restic.lookup_count(), 0);

        assert_eq!(service.fetch("latest", "a.md").await.unwrap().content, b"v2");
        assert_eq!(git.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_and_invalid_input() {
        let (service, _, _) = service(
            Path::new("/vault"),
            FakeHistory::default(),
            FakeHistory::default(),
        );

        assert!(matches!(
            service.fetch("abcdef12", "notes/a.md").await,
            Err(RestoreError::NotFound { .. })
        ));
        assert!(matches!(
            service.fetch("latest", "../../etc/passwd").await,
            Err(RestoreError::InvalidPath(_))
        ));
        assert!(matches!(
            service.fetch("", "notes/a.md").await,
            Err(RestoreError::InvalidSource(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_in_place_and_to_target() {
        let vault = TempDir::new().unwrap();
        let restic = FakeHistory::default().with(
            "latest",
            &vault.path().join("notes/a.md").to_string_lossy(),
            "restored",
        );
        let (service, _, _) = service(vault.path(), FakeHistory::default(), restic);

        let restored = service.restore("latest", "notes/a.md", None).await.unwrap();
        assert_eq!(restored.target, vault.path().join("notes/a.md"));
        assert_eq!(fs::read_to_string(&restored.target).unwrap(), "restored");

        let elsewhere = vault.path().join("out/copy.md");
        let restored = service
            .restore("latest", "notes/a.md", Some(&elsewhere))
            .await
            .unwrap();
        assert_eq!(restored.origin, RestoreOrigin::Restic);
        assert_eq!(fs::read_to_string(elsewhere).unwrap(), "restored");
    }

    #[tokio::test]
    async fn test_git_restore_round_trip() {
        if std::process::Command::new("git").arg("--version").output().is_err() {
            eprintln!("git not installed, skipping");
            return;
        }

        let vault = TempDir::new().unwrap();
        let git = Arc::new(Git::new(vault.path(), Duration::from_secs(30)));
        git.init_vault().await.unwrap();

        fs::write(vault.path().join("daily.md"), "as of the commit").unwrap();
        let hash = git.commit("snapshot daily").await.unwrap();
        fs::write(vault.path().join("daily.md"), "edited later").unwrap();

        let service = RestoreService::new(vault.path(), git, Arc::new(FakeHistory::default()));

        let short = &hash[..12];
        let restored = service.restore(short, "daily.md", None).await.unwrap();

        assert_eq!(restored.origin, RestoreOrigin::Git);
        assert_eq!(
            fs::read(vault.path().join("daily.md")).unwrap(),
            b"as of the commit"
        );
    }
}
