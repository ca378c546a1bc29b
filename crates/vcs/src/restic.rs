//! Restic as the remote snapshot collaborator
//!
//! Repository location and password are passed through the environment
//! (`RESTIC_REPOSITORY`, `RESTIC_PASSWORD`), so they never show up in
//! process listings or logs.

use crate::command::{ToolCommand, ToolError};
use crate::{is_safe_revision, Snapshot, SnapshotEntry, SnapshotStore};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_core::{RetentionSettings, Settings};

/// Tag added to every snapshot taken by the sidecar
const AUTO_BACKUP_TAG: &str = "auto-backup";

/// Restic repository holding vault snapshots
#[derive(Debug, Clone)]
pub struct Restic {
    vault: PathBuf,
    tag: String,
    repository: Option<String>,
    password: Option<String>,
    retention: RetentionSettings,
    timeout: Duration,
}

impl Restic {
    pub fn new(vault: &Path, tag: &str, timeout: Duration) -> Self {
        Self {
            vault: vault.to_path_buf(),
            tag: tag.to_string(),
            repository: None,
            password: None,
            retention: RetentionSettings::default(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let mut restic = Self::new(
            &settings.vault_path,
            &settings.restic_tag,
            settings.command_timeout(),
        );
        restic.repository = settings.restic_repository.clone();
        restic.password = settings.restic_password.clone();
        restic.retention = settings.retention.clone();
        restic
    }

    /// Tag used to filter listings by default
    pub fn tag(&self) -> &str {
        &self.tag
    }

    fn restic(&self) -> ToolCommand {
        let mut command = ToolCommand::new("restic", self.timeout);
        if let Some(ref repository) = self.repository {
            command = command.env("RESTIC_REPOSITORY", repository.clone());
        }
        if let Some(ref password) = self.password {
            command = command.env("RESTIC_PASSWORD", password.clone());
        }
        command
    }

    /// Check the repository is initialized and reachable
    ///
    /// Returns false (with a warning) rather than failing: the sidecar keeps
    /// committing locally while the remote is unavailable.
    pub async fn check_repository(&self) -> Result<bool, ToolError> {
        let output = self.restic().args(["snapshots", "--quiet"]).output().await?;
        if output.success() {
            info!("Restic repository verified");
            Ok(true)
        } else {
            warn!(
                stderr = %output.stderr,
                "Restic repository not found. Run 'restic init' to initialize. Continuing without remote backups"
            );
            Ok(false)
        }
    }
}

#[async_trait]
impl SnapshotStore for Restic {
    async fn push(&self) -> Result<Option<String>, ToolError> {
        let exclude = self.vault.join(".git");
        let output = self
            .restic()
            .arg("backup")
            .arg(self.vault.as_os_str())
            .args(["--tag", self.tag.as_str(), "--tag", AUTO_BACKUP_TAG])
            .arg("--exclude")
            .arg(exclude.as_os_str())
            .arg("--json")
            .run()
            .await?;

        let snapshot_id = parse_backup_summary(&output.stdout_text());
        info!(snapshot = ?snapshot_id, "Restic backup completed");
        Ok(snapshot_id)
    }

    async fn apply_retention(&self) -> Result<bool, ToolError> {
        if !self.retention.is_enabled() {
            return Ok(false);
        }

        let mut command = self.restic().args(["forget", "--tag", self.tag.as_str()]);
        let policies = [
            ("--keep-daily", self.retention.keep_daily),
            ("--keep-weekly", self.retention.keep_weekly),
            ("--keep-monthly", self.retention.keep_monthly),
        ];
        for (flag, keep) in policies {
            if let Some(keep) = keep {
                command = command.arg(flag).arg(keep.to_string());
            }
        }
        command.arg("--prune").run().await?;

        info!("Applied snapshot retention policy");
        Ok(true)
    }

    async fn list_snapshots(&self, tag: Option<&str>) -> Result<Vec<Snapshot>, ToolError> {
        debug!(tag = ?tag, "Listing restic snapshots");
        let mut command = self.restic().args(["snapshots", "--json"]);
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            command = command.args(["--tag", tag]);
        }

        let output = command.output().await?;
        if !output.success() {
            warn!(stderr = %output.stderr, "Listing restic snapshots failed");
            return Ok(Vec::new());
        }

        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        match parse_snapshots(&text) {
            Ok(snapshots) => Ok(snapshots),
            Err(e) => {
                warn!(error = %e, "Failed to parse restic snapshots JSON");
                Ok(Vec::new())
            }
        }
    }

    async fn list_files(
        &self,
        snapshot: &str,
        prefix: Option<&str>,
    ) -> Result<Option<Vec<SnapshotEntry>>, ToolError> {
        if !is_safe_revision(snapshot) {
            return Ok(None);
        }

        debug!(snapshot, prefix = ?prefix, "Listing snapshot files");
        let output = self
            .restic()
            .args(["ls", "--json", snapshot])
            .output()
            .await?;

        if !output.success() {
            debug!(snapshot, stderr = %output.stderr, "Snapshot not found");
            return Ok(None);
        }

        let mut entries = parse_ls(&output.stdout_text());
        if let Some(prefix) = prefix.filter(|p| *p != "/" && !p.is_empty()) {
            let prefix = prefix.trim_end_matches('/');
            entries.retain(|entry| entry.path.starts_with(prefix));
        }
        Ok(Some(entries))
    }

    async fn dump(&self, snapshot: &str, path: &str) -> Result<Option<Vec<u8>>, ToolError> {
        if !is_safe_revision(snapshot) {
            return Ok(None);
        }

        let output = self
            .restic()
            .args(["dump", snapshot, path])
            .output()
            .await?;

        if output.success() {
            Ok(Some(output.stdout))
        } else {
            debug!(snapshot, path, stderr = %output.stderr, "File not found in snapshot");
            Ok(None)
        }
    }
}

#[derive(Deserialize)]
struct RawSnapshot {
    id: String,
    #[serde(default)]
    short_id: Option<String>,
    time: String,
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Parse `restic snapshots --json`
///
/// Snapshots without a `short_id` get the first 8 characters of their ID.
pub fn parse_snapshots(raw: &str) -> Result<Vec<Snapshot>, ToolError> {
    let entries: Vec<RawSnapshot> = serde_json::from_str(raw).map_err(|e| ToolError::Parse {
        program: "restic",
        reason: e.to_string(),
    })?;

    Ok(entries
        .into_iter()
        .map(|s| {
            let short_id = s
                .short_id
                .unwrap_or_else(|| s.id.chars().take(8).collect());
            Snapshot {
                id: s.id,
                short_id,
                time: s.time,
                paths: s.paths,
                tags: s.tags,
            }
        })
        .collect())
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default)]
    struct_type: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    mtime: Option<String>,
}

/// Parse `restic ls --json` (one JSON object per line)
///
/// The leading snapshot metadata line and malformed lines are skipped.
pub fn parse_ls(raw: &str) -> Vec<SnapshotEntry> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<RawNode>(line).ok())
        .filter(|node| node.struct_type.as_deref() != Some("snapshot"))
        .map(|node| SnapshotEntry {
            path: node.path.unwrap_or_default(),
            kind: node.kind.unwrap_or_else(|| "file".to_string()),
            size: node.size.unwrap_or(0),
            mtime: node.mtime.unwrap_or_default(),
        })
        .collect()
}

/// Snapshot ID from the summary line of `restic backup --json`
fn parse_backup_summary(raw: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Message {
        message_type: String,
        #[serde(default)]
        snapshot_id: Option<String>,
    }

    raw.lines()
        .filter_map(|line| serde_json::from_str::<Message>(line).ok())
        .filter(|message| message.message_type == "summary")
        .find_map(|message| message.snapshot_id)
}
