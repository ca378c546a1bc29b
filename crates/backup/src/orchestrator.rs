//! Backup orchestrator
//!
//! One cycle is commit-then-push:
//! 1. Read the working-tree status (read-only)
//! 2. Commit stage: commit when there are changes
//! 3. Push stage: snapshot the vault when something is worth pushing
//! 4. Record timestamps and clear `pending`
//!
//! Every failure is returned as data in [`BackupCycleResult`]; nothing here
//! panics or propagates past the caller.

use crate::summarize::{commit_message, template_subject, Summarizer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use vault_core::{StateError, StateStore};
use vault_vcs::{FileChange, SnapshotStore, ToolError, VersionControl};

/// Stage of a backup cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Commit,
    Push,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Commit => f.write_str("commit"),
            Stage::Push => f.write_str("push"),
        }
    }
}

/// Recoverable cycle failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleError {
    #[error("commit failed: {detail}")]
    CommitFailed { detail: String },

    #[error("push failed: {detail}")]
    PushFailed { detail: String },

    /// The tool behind a stage is missing or misconfigured
    #[error("{stage} failed, external tool unavailable: {detail}")]
    ExternalToolUnavailable { stage: Stage, detail: String },
}

impl CycleError {
    fn from_tool(stage: Stage, err: &ToolError) -> Self {
        let detail = err.to_string();
        if err.is_unavailable() {
            return CycleError::ExternalToolUnavailable { stage, detail };
        }
        match stage {
            Stage::Commit => CycleError::CommitFailed { detail },
            Stage::Push => CycleError::PushFailed { detail },
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            CycleError::CommitFailed { .. } => Stage::Commit,
            CycleError::PushFailed { .. } => Stage::Push,
            CycleError::ExternalToolUnavailable { stage, .. } => *stage,
        }
    }
}

/// Outcome of one backup cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupCycleResult {
    pub success: bool,
    /// A new remote snapshot was produced
    pub backup_created: bool,
    /// A new local commit was produced
    pub committed: bool,
    pub dry_run: bool,
    pub changes_summary: String,
    pub commit: Option<String>,
    pub snapshot_id: Option<String>,
    /// Present iff `success` is false
    pub error: Option<CycleError>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BackupCycleResult {
    fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            success: true,
            backup_created: false,
            committed: false,
            dry_run,
            changes_summary: String::new(),
            commit: None,
            snapshot_id: None,
            error: None,
            started_at,
            duration_ms: 0,
        }
    }

    fn finish(mut self, clock: Instant) -> Self {
        self.duration_ms = clock.elapsed().as_millis() as u64;
        self
    }

    fn fail(mut self, err: CycleError, clock: Instant) -> Self {
        self.success = false;
        self.error = Some(err);
        self.finish(clock)
    }

    /// Short-circuit success: nothing to commit and nothing worth pushing
    pub fn is_no_changes(&self) -> bool {
        self.success && !self.committed && !self.backup_created && !self.dry_run
    }
}

/// Runs backup cycles against the two persistence collaborators
pub struct Orchestrator {
    state: Arc<StateStore>,
    vcs: Arc<dyn VersionControl>,
    snapshots: Arc<dyn SnapshotStore>,
    summarizer: Option<Arc<dyn Summarizer>>,
    /// Remote snapshot age that forces a push even without new commits
    backup_interval: Duration,
    dry_run: bool,
}

impl Orchestrator {
    pub fn new(
        state: Arc<StateStore>,
        vcs: Arc<dyn VersionControl>,
        snapshots: Arc<dyn SnapshotStore>,
        backup_interval: Duration,
    ) -> Self {
        Self {
            state,
            vcs,
            snapshots,
            summarizer: None,
            backup_interval,
            dry_run: false,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one commit-then-push cycle
    ///
    /// Callers must hold the backup guard.
    pub async fn run_backup_cycle(&self) -> BackupCycleResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let before = self.state.snapshot();
        let mut result = BackupCycleResult::new(started_at, self.dry_run);

        // 1. Diff detection
        let changes = match self.vcs.status().await {
            Ok(changes) => changes,
            Err(e) if self.dry_run => {
                warn!(error = %e, "Reading working tree status failed during dry run");
                result.changes_summary = format!("dry run: could not read working tree status: {}", e);
                return result.finish(clock);
            }
            Err(e) => {
                error!(error = %e, "Reading working tree status failed");
                self.persist("pending", self.state.mark_pending());
                return result.fail(CycleError::from_tool(Stage::Commit, &e), clock);
            }
        };

        let stale = before.backup_is_stale(started_at, self.backup_interval);
        let push_needed = !changes.is_empty() || before.pending || stale;
        debug!(
            changes = changes.len(),
            pending = before.pending,
            stale,
            "Backup cycle plan"
        );

        if self.dry_run {
            return self.dry_run_report(result, &changes, push_needed, clock);
        }

        // 2. Commit stage
        if changes.is_empty() {
            debug!("No uncommitted changes, skipping commit");
        } else {
            let message = commit_message(self.summarizer.as_deref(), &changes).await;
            match self.vcs.commit(&message).await {
                Ok(hash) => {
                    info!(commit = %hash, files = changes.len(), "Committed vault changes");
                    self.persist("last_commit", self.state.record_commit(Utc::now()));
                    result.committed = true;
                    result.commit = Some(hash);
                    result.changes_summary = message.lines().next().unwrap_or_default().to_string();
                }
                Err(e) => {
                    error!(error = %e, "Commit failed, skipping push");
                    self.persist("pending", self.state.mark_pending());
                    result.changes_summary = template_subject(&changes);
                    return result.fail(CycleError::from_tool(Stage::Commit, &e), clock);
                }
            }
        }

        if !push_needed {
            info!("No changes since last backup");
            result.changes_summary = "no changes".to_string();
            return result.finish(clock);
        }

        if !result.committed {
            result.changes_summary = if before.pending {
                "retrying remote snapshot of pending changes".to_string()
            } else {
                "no new commits, refreshing stale remote snapshot".to_string()
            };
        }

        // 3. Push stage
        match self.snapshots.push().await {
            Ok(snapshot_id) => {
                // 4. Record success
                self.persist("last_backup", self.state.record_backup(Utc::now()));
                match self.state.clear_pending_if_quiet_since(started_at) {
                    Ok(true) => {}
                    Ok(false) => debug!("Changes arrived during the cycle, pending stays set"),
                    Err(e) => warn!(error = %e, "Failed to clear pending state marker"),
                }
                result.backup_created = true;
                result.snapshot_id = snapshot_id;
            }
            Err(e) => {
                // The local commit stays; the next trigger pushes again
                error!(error = %e, committed = result.committed, "Remote snapshot failed");
                self.persist("pending", self.state.mark_pending());
                return result.fail(CycleError::from_tool(Stage::Push, &e), clock);
            }
        }

        if let Err(e) = self.snapshots.apply_retention().await {
            warn!(error = %e, "Snapshot retention failed");
        }

        let result = result.finish(clock);
        info!(
            commit = ?result.commit,
            snapshot = ?result.snapshot_id,
            duration_ms = result.duration_ms,
            "Backup cycle completed"
        );
        result
    }

    /// Report what a real cycle would do without running any mutating command
    fn dry_run_report(
        &self,
        mut result: BackupCycleResult,
        changes: &[FileChange],
        push_needed: bool,
        clock: Instant,
    ) -> BackupCycleResult {
        let commit = if changes.is_empty() {
            "nothing to commit".to_string()
        } else {
            format!("would commit: {}", template_subject(changes))
        };
        let push = if push_needed {
            "would push a remote snapshot"
        } else {
            "no push needed"
        };

        result.changes_summary = format!("dry run: {}; {}", commit, push);
        info!(summary = %result.changes_summary, "Dry run cycle");
        result.finish(clock)
    }

    fn persist(&self, marker: &str, outcome: Result<(), StateError>) {
        if let Err(e) = outcome {
            warn!(marker, error = %e, "Failed to update state marker");
        }
    }
}
