//! Backup core: orchestrator, guard, notifications and commit messages
//!
//! ```text
//! trigger ──► BackupGuard::try_run ──► Orchestrator::run_backup_cycle
//!                  │                       │ commit (VersionControl)
//!                  │                       │ push   (SnapshotStore)
//!                  ▼                       ▼
//!              Notifier               StateStore markers
//! ```

pub mod guard;
pub mod notifier;
pub mod orchestrator;
pub mod summarize;

#[cfg(test)]
pub(crate) mod testing;

pub use guard::{BackupGuard, TriggerOutcome};
pub use notifier::{
    Notification, Notifier, NotifyError, NotifyProvider, NtfyProvider, Severity, WebhookProvider,
};
pub use orchestrator::{BackupCycleResult, CycleError, Orchestrator, Stage};
pub use summarize::{
    commit_message, template_message, template_subject, LlmSummarizer, SummarizeError, Summarizer,
};
