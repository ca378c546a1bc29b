//! File system watching for the vault backup sidecar
//!
//! This crate provides:
//! - Recursive vault watching on top of `notify`
//! - Ignore filtering (built-in rules, .gitignore, config patterns)
//! - The debounce/coalescing scheduler
//! - The periodic staleness trigger
//!
//! Data flow:
//! ```text
//! notify thread -> EventFilter -> StateStore::record_change
//!                              -> ChangeSignal (bounded channel) -> DebounceScheduler -> CycleTrigger
//! PeriodicTrigger (tick) -------------------------------------------------------------> CycleTrigger
//! ```

pub mod debounce;
pub mod ignore;
pub mod reconcile;

pub use debounce::{CycleTrigger, DebounceScheduler, TriggerSource};
pub use ignore::IgnoreRules;
pub use reconcile::{should_fire, PeriodicTrigger};

use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vault_core::StateStore;

/// Watcher errors
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The OS notification mechanism could not be set up (e.g. inotify limits)
    #[error("failed to initialize change detection for {path}: {source}")]
    Init {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("invalid ignore pattern: {0}")]
    Ignore(#[from] ::ignore::Error),
}

/// Type of vault change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// A filtered filesystem event
#[derive(Debug, Clone)]
pub struct VaultEvent {
    /// Path that changed
    pub path: PathBuf,
    /// Type of change
    pub kind: VaultEventKind,
    /// When the watcher observed it
    pub at: DateTime<Utc>,
}

/// "Something changed" signal for the scheduler
///
/// Carries no payload beyond the observation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSignal {
    pub at: DateTime<Utc>,
}

/// Create the bounded watcher -> scheduler channel
pub fn signal_channel(capacity: usize) -> (SignalSender, mpsc::Receiver<ChangeSignal>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SignalSender { tx }, rx)
}

/// Non-blocking sending half of the signal channel
///
/// A full channel drops the signal: the scheduler already has one queued and
/// only needs to know that something changed.
#[derive(Debug, Clone)]
pub struct SignalSender {
    tx: mpsc::Sender<ChangeSignal>,
}

impl SignalSender {
    /// Send a signal; returns false if it was dropped
    pub fn notify(&self, signal: ChangeSignal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Signal channel full, coalescing change signal");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Scheduler gone, dropping change signal");
                false
            }
        }
    }
}

/// Map a notify event kind onto a vault change kind
///
/// Access and unclassified events are not changes.
pub fn classify_event(kind: &notify::EventKind) -> Option<VaultEventKind> {
    match kind {
        notify::EventKind::Create(_) => Some(VaultEventKind::Created),
        notify::EventKind::Modify(ModifyKind::Name(_)) => Some(VaultEventKind::Moved),
        notify::EventKind::Modify(_) => Some(VaultEventKind::Modified),
        notify::EventKind::Remove(_) => Some(VaultEventKind::Deleted),
        notify::EventKind::Access(_) | notify::EventKind::Any | notify::EventKind::Other => None,
    }
}

/// Filters raw notify events and turns them into state updates and signals
///
/// Runs on the notify callback thread; owns the ignore rules so a change to
/// the vault's .gitignore can rebuild them in place.
pub struct EventFilter {
    rules: IgnoreRules,
    state: Arc<StateStore>,
    signals: SignalSender,
}

impl EventFilter {
    pub fn new(rules: IgnoreRules, state: Arc<StateStore>, signals: SignalSender) -> Self {
        Self {
            rules,
            state,
            signals,
        }
    }

    /// Handle one notify callback
    ///
    /// Returns the events that passed the filter. Emits at most one signal.
    pub fn handle(&mut self, result: notify::Result<notify::Event>) -> Vec<VaultEvent> {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                // Transient delivery errors are never fatal after startup
                warn!(error = %e, "File watcher error");
                return Vec::new();
            }
        };

        let Some(kind) = classify_event(&event.kind) else {
            return Vec::new();
        };

        if event.paths.iter().any(|p| self.rules.is_gitignore_file(p)) {
            match self.rules.reload_gitignore() {
                Ok(()) => info!("Reloaded .gitignore rules"),
                Err(e) => warn!(error = %e, "Failed to reload .gitignore, keeping previous rules"),
            }
        }

        let at = Utc::now();
        let accepted: Vec<VaultEvent> = event
            .paths
            .into_iter()
            .filter(|path| !self.rules.should_ignore(path))
            .map(|path| VaultEvent { path, kind, at })
            .collect();

        if accepted.is_empty() {
            return accepted;
        }

        for vault_event in &accepted {
            debug!(path = %vault_event.path.display(), kind = ?vault_event.kind, "Vault change");
        }

        if let Err(e) = self.state.record_change(at) {
            warn!(error = %e, "Failed to persist change marker");
        }
        self.signals.notify(ChangeSignal { at });

        accepted
    }
}

/// Running vault watcher
///
/// Watching stops when this is dropped.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl VaultWatcher {
    /// Start watching the vault recursively
    ///
    /// Failure to initialize is fatal: the sidecar cannot work without
    /// change detection.
    pub fn start(root: &Path, filter: EventFilter) -> Result<Self, WatchError> {
        let root = ignore::canonical_root(root);
        let root = root.as_path();
        let mut filter = filter;
        let init_error = |source: notify::Error| WatchError::Init {
            path: root.to_path_buf(),
            source,
        };

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            filter.handle(result);
        })
        .map_err(init_error)?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(init_error)?;

        info!(vault = %root.display(), "Watching vault for changes");

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }

    /// Watched vault root
    pub fn root(&self) -> &Path {
        &self.root
    }
}
