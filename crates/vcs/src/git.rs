//! Git as the local version-control collaborator
//!
//! All commands run with the vault as working directory. Commit identity is
//! passed with `-c` so commits never depend on the host's global config.

use crate::command::{ToolCommand, ToolError};
use crate::{is_safe_revision, ChangeKind, CommitRecord, FileChange, VersionControl};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_core::Settings;

/// Hash, short hash, ISO author date, subject: four lines per commit
const LOG_FORMAT: &str = "--format=%H%n%h%n%aI%n%s";

/// .gitignore written into a freshly initialized vault repository
pub const GITIGNORE_TEMPLATE: &str = "\
# Obsidian workspace files (change frequently, not useful to track)
.obsidian/workspace.json
.obsidian/workspace-mobile.json
.obsidian/workspaces.json

# Trash
.trash/

# System files
.DS_Store
Thumbs.db

# Backup test files
.backup-write-test
";

/// Git repository in the vault
#[derive(Debug, Clone)]
pub struct Git {
    root: PathBuf,
    timeout: Duration,
    user_name: String,
    user_email: String,
}

impl Git {
    pub fn new(root: &Path, timeout: Duration) -> Self {
        Self {
            root: root.to_path_buf(),
            timeout,
            user_name: "Vault Backup".to_string(),
            user_email: "vault-backup@localhost".to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.vault_path, settings.command_timeout())
            .with_identity(&settings.git_user_name, &settings.git_user_email)
    }

    pub fn with_identity(mut self, name: &str, email: &str) -> Self {
        self.user_name = name.to_string();
        self.user_email = email.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self) -> ToolCommand {
        ToolCommand::new("git", self.timeout).current_dir(&self.root)
    }

    /// Prepare the vault repository at startup
    ///
    /// Returns true if a new repository was created.
    pub async fn init_repository(&self) -> Result<bool, ToolError> {
        self.mark_safe_directory().await?;
        self.init_vault().await
    }

    /// Trust the vault directory (Git 2.35.2+ refuses repos owned by another user)
    ///
    /// Prefers the system config, falls back to the global one.
    pub async fn mark_safe_directory(&self) -> Result<(), ToolError> {
        let root = self.root.to_string_lossy().into_owned();

        let existing = ToolCommand::new("git", self.timeout)
            .args(["config", "--get-all", "safe.directory"])
            .output()
            .await?;
        if existing.stdout_text().lines().any(|line| line == root || line == "*") {
            debug!(vault = %root, "Vault already marked as safe.directory");
            return Ok(());
        }

        let system = ToolCommand::new("git", self.timeout)
            .args(["config", "--system", "--add", "safe.directory"])
            .arg(&root)
            .output()
            .await?;
        if system.success() {
            return Ok(());
        }

        debug!(stderr = %system.stderr, "System git config not writable, using global");
        ToolCommand::new("git", self.timeout)
            .args(["config", "--global", "--add", "safe.directory"])
            .arg(&root)
            .run()
            .await?;
        Ok(())
    }

    /// Initialize the repository if missing and apply vault git settings
    pub async fn init_vault(&self) -> Result<bool, ToolError> {
        // 1. Create the repository and seed .gitignore
        let created = if self.root.join(".git").exists() {
            false
        } else {
            info!(vault = %self.root.display(), "Initializing git repository in vault");
            self.git().args(["init", "-q"]).run().await?;

            let gitignore = self.root.join(".gitignore");
            if !gitignore.exists() {
                info!("Creating .gitignore");
                crate::write_restored(&gitignore, GITIGNORE_TEMPLATE.as_bytes()).await?;
            }
            true
        };

        // 2. Identity and line-ending settings
        let settings = [
            ("user.name", self.user_name.as_str()),
            ("user.email", self.user_email.as_str()),
            ("core.autocrlf", "input"),
            ("core.safecrlf", "false"),
        ];
        for (key, value) in settings {
            self.git().args(["config", key, value]).run().await?;
        }

        info!(
            user = %self.user_name,
            email = %self.user_email,
            "Git configured"
        );
        Ok(created)
    }
}

#[async_trait]
impl VersionControl for Git {
    async fn status(&self) -> Result<Vec<FileChange>, ToolError> {
        let output = self
            .git()
            .args(["status", "--porcelain", "-z", "--untracked-files=all"])
            .run()
            .await?;
        Ok(parse_porcelain(&output.stdout))
    }

    async fn commit(&self, message: &str) -> Result<String, ToolError> {
        self.git().args(["add", "-A"]).run().await?;

        self.git()
            .arg("-c")
            .arg(format!("user.name={}", self.user_name))
            .arg("-c")
            .arg(format!("user.email={}", self.user_email))
            .args(["-c", "commit.gpgsign=false"])
            .args(["commit", "-q", "--no-verify", "-m", message])
            .run()
            .await?;

        let head = self.git().args(["rev-parse", "HEAD"]).run().await?;
        Ok(head.stdout_text().trim().to_string())
    }

    async fn log(&self, count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        debug!(count, "Listing git commits");
        let output = self
            .git()
            .args(["log", LOG_FORMAT])
            .arg(format!("-{}", count))
            .output()
            .await?;

        // No commits yet (or not a repository): empty history
        if !output.success() {
            return Ok(Vec::new());
        }
        Ok(parse_git_log(&output.stdout_text()))
    }

    async fn file_history(&self, path: &str, count: usize) -> Result<Vec<CommitRecord>, ToolError> {
        debug!(path, count, "Listing file history");
        let output = self
            .git()
            .args(["log", "--follow", LOG_FORMAT])
            .arg(format!("-{}", count))
            .args(["--", path])
            .output()
            .await?;

        if !output.success() {
            return Ok(Vec::new());
        }
        Ok(parse_git_log(&output.stdout_text()))
    }

    async fn show(&self, commit: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        if !is_safe_revision(commit) {
            warn!(commit, "Rejected commit identifier");
            return Ok(None);
        }

        let output = self
            .git()
            .arg("show")
            .arg(format!("{}:{}", commit, path))
            .output()
            .await?;

        if output.success() {
            Ok(Some(output.stdout))
        } else {
            debug!(commit, path, stderr = %output.stderr, "File not found at commit");
            Ok(None)
        }
    }
}

/// Parse `git status --porcelain -z` output
///
/// Renames and copies carry the original path as an extra NUL-separated field.
pub fn parse_porcelain(raw: &[u8]) -> Vec<FileChange> {
    let text = String::from_utf8_lossy(raw);
    let mut fields = text.split('\0').filter(|field| !field.is_empty());
    let mut changes = Vec::new();

    while let Some(entry) = fields.next() {
        let bytes = entry.as_bytes();
        if bytes.len() < 4 {
            continue;
        }

        let kind = match (bytes[0], bytes[1]) {
            (b'?', b'?') => ChangeKind::Added,
            (b'R', _) | (_, b'R') => {
                fields.next();
                ChangeKind::Renamed
            }
            (b'C', _) | (_, b'C') => {
                fields.next();
                ChangeKind::Added
            }
            (b'D', _) | (_, b'D') => ChangeKind::Deleted,
            (b'A', _) | (_, b'A') => ChangeKind::Added,
            _ => ChangeKind::Modified,
        };

        changes.push(FileChange {
            path: entry[3..].to_string(),
            kind,
        });
    }

    changes
}

/// Parse `git log` output in the four-lines-per-commit format
///
/// A trailing partial record is dropped.
pub fn parse_git_log(output: &str) -> Vec<CommitRecord> {
    let lines: Vec<&str> = output.trim().lines().collect();
    lines
        .chunks_exact(4)
        .map(|record| CommitRecord {
            hash: record[0].to_string(),
            short_hash: record[1].to_string(),
            date: record[2].to_string(),
            message: record[3].to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .is_ok()
    }

    #[test]
    fn test_parse_porcelain() {
        let raw = b" M notes/daily.md\0?? notes/new.md\0D  old.md\0R  renamed.md\0original.md\0A  added.md\0";

        let changes = parse_porcelain(raw);

        assert_eq!(
            changes,
            vec![
                FileChange { path: "notes/daily.md".into(), kind: ChangeKind::Modified },
                FileChange { path: "notes/new.md".into(), kind: ChangeKind::Added },
                FileChange { path: "old.md".into(), kind: ChangeKind::Deleted },
                FileChange { path: "renamed.md".into(), kind: ChangeKind::Renamed },
                FileChange { path: "added.md".into(), kind: ChangeKind::Added },
            ]
        );
    }

    #[test]
    fn test_parse_porcelain_paths_with_spaces() {
        let changes = parse_porcelain(b"?? Daily Notes/2024-01-01.md\0");
        assert_eq!(changes[0].path, "Daily Notes/2024-01-01.md");
        assert!(parse_porcelain(b"").is_empty());
    }

    #[test]
    fn test_parse_git_log() {
        let output = "\
aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
aaaaaaa
2024-01-02T10:00:00+00:00
vault backup: 1 file changed
bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb
bbbbbbb
2024-01-01T09:00:00+00:00
initial
";
        let commits = parse_git_log(output);

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].short_hash, "aaaaaaa");
        assert_eq!(commits[0].message, "vault backup: 1 file changed");
        assert_eq!(commits[1].date, "2024-01-01T09:00:00+00:00");
    }

    #[test]
    fn test_parse_git_log_drops_partial_record() {
        let commits = parse_git_log("abc\nab\n2024-01-01T00:00:00Z\n");
        assert!(commits.is_empty());
        assert!(parse_git_log("").is_empty());
    }

    #[tokio::test]
    async fn test_commit_log_and_show_round_trip() {
        if !git_available() {
            eprintln!("git not installed, skipping");
            return;
        }

        let vault = TempDir::new().unwrap();
        let git = Git::new(vault.path(), Duration::from_secs(30));

        assert!(git.init_vault().await.unwrap());
        assert!(vault.path().join(".gitignore").exists());
        // Second run finds the existing repository
        assert!(!git.init_vault().await.unwrap());

        fs::create_dir_all(vault.path().join("notes")).unwrap();
        fs::write(vault.path().join("notes/a.md"), "first version").unwrap();
        fs::create_dir_all(vault.path().join(".trash")).unwrap();
        fs::write(vault.path().join(".trash/gone.md"), "trashed").unwrap();

        let status = git.status().await.unwrap();
        assert!(status.contains(&FileChange {
            path: "notes/a.md".into(),
            kind: ChangeKind::Added
        }));
        assert!(!status.iter().any(|c| c.path.starts_with(".trash")));

        let hash = git.commit("first").await.unwrap();
        assert_eq!(hash.len(), 40);
        assert!(!git.has_uncommitted_changes().await.unwrap());

        fs::write(vault.path().join("notes/a.md"), "second version").unwrap();
        assert!(git.has_uncommitted_changes().await.unwrap());

        let log = git.log(5).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].hash, hash);
        assert_eq!(log[0].message, "first");

        let history = git.file_history("notes/a.md", 10).await.unwrap();
        assert_eq!(history.len(), 1);

        let content = git.show(&hash, "notes/a.md").await.unwrap();
        assert_eq!(content.as_deref(), Some(&b"first version"[..]));

        assert_eq!(git.show(&hash, "notes/missing.md").await.unwrap(), None);
        assert_eq!(git.show("deadbeef", "notes/a.md").await.unwrap(), None);
        assert_eq!(git.show("--output=x", "notes/a.md").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_log_of_empty_repository() {
        if !git_available() {
            return;
        }

        let vault = TempDir::new().unwrap();
        let git = Git::new(vault.path(), Duration::from_secs(30));
        git.init_vault().await.unwrap();

        assert!(git.log(10).await.unwrap().is_empty());
    }
}
