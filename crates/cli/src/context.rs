//! Explicit application context
//!
//! Built once at startup and shared by the scheduler, the periodic trigger
//! and the HTTP server. There are no process-wide singletons.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use vault_backup_core::{BackupGuard, LlmSummarizer, Notifier, Orchestrator, Summarizer};
use vault_core::{Settings, StateStore};
use vault_vcs::{Git, Restic, RestoreService, SnapshotStore, VersionControl};

pub struct AppContext {
    pub settings: Settings,
    pub state: Arc<StateStore>,
    pub guard: Arc<BackupGuard>,
    pub restore: RestoreService,
    pub started: Instant,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        state: Arc<StateStore>,
        vcs: Arc<dyn VersionControl>,
        snapshots: Arc<dyn SnapshotStore>,
        notifier: Notifier,
        summarizer: Option<Arc<dyn Summarizer>>,
    ) -> Self {
        let mut orchestrator = Orchestrator::new(
            state.clone(),
            vcs.clone(),
            snapshots.clone(),
            settings.backup_interval(),
        )
        .with_dry_run(settings.dry_run);
        if let Some(summarizer) = summarizer {
            orchestrator = orchestrator.with_summarizer(summarizer);
        }

        let restore = RestoreService::new(&settings.vault_path, vcs, snapshots);

        Self {
            state,
            guard: Arc::new(BackupGuard::new(orchestrator, notifier)),
            restore,
            started: Instant::now(),
            settings,
        }
    }

    pub fn vcs(&self) -> &Arc<dyn VersionControl> {
        self.restore.git()
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        self.restore.restic()
    }
}

/// Commit summarizer, when enabled
pub fn summarizer(settings: &Settings) -> Option<Arc<dyn Summarizer>> {
    if !settings.llm.enabled {
        return None;
    }
    Some(Arc::new(LlmSummarizer::new(&settings.llm)))
}

/// Read-only services for browsing commands (no daemon, no lock)
pub fn browsing_services(settings: &Settings) -> RestoreService {
    RestoreService::new(
        &settings.vault_path,
        Arc::new(Git::from_settings(settings)),
        Arc::new(Restic::from_settings(settings)),
    )
}

/// State markers without creating anything on disk
pub fn load_state(settings: &Settings) -> Result<StateStore> {
    StateStore::load(&settings.state_dir).with_context(|| {
        format!(
            "Failed to read state markers in {}",
            settings.state_dir.display()
        )
    })
}
