//! Mutual-exclusion guard around the orchestrator
//!
//! Every trigger source (debounce expiry, periodic tick, manual request,
//! startup catch-up) goes through [`BackupGuard::try_run`]. Acquisition never
//! waits: a trigger that finds a cycle in flight is dropped, since that cycle
//! already covers every change made before it read the working tree.

use crate::notifier::Notifier;
use crate::orchestrator::{BackupCycleResult, Orchestrator};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use vault_watcher::{CycleTrigger, TriggerSource};

/// What happened to a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The cycle ran; its result may still be a failure
    Completed(BackupCycleResult),
    /// Another cycle was in flight, trigger dropped
    Busy,
    /// Shutdown has begun, no new cycles start
    ShuttingDown,
}

pub struct BackupGuard {
    orchestrator: Orchestrator,
    lock: tokio::sync::Mutex<()>,
    running: AtomicBool,
    accepting: AtomicBool,
    notifier: Notifier,
    last_result: Mutex<Option<BackupCycleResult>>,
}

impl BackupGuard {
    pub fn new(orchestrator: Orchestrator, notifier: Notifier) -> Self {
        Self {
            orchestrator,
            lock: tokio::sync::Mutex::new(()),
            running: AtomicBool::new(false),
            accepting: AtomicBool::new(true),
            notifier,
            last_result: Mutex::new(None),
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run a cycle unless one is already in flight
    pub async fn try_run(&self, source: TriggerSource) -> TriggerOutcome {
        if !self.is_accepting() {
            debug!(%source, "Trigger ignored during shutdown");
            return TriggerOutcome::ShuttingDown;
        }

        let Ok(_held) = self.lock.try_lock() else {
            debug!(%source, "Backup cycle already running, trigger dropped");
            return TriggerOutcome::Busy;
        };

        // stop_accepting may have landed between the check and the lock
        if !self.is_accepting() {
            return TriggerOutcome::ShuttingDown;
        }

        // Declared after `_held`, so the flag clears before the lock is released
        let _running = RunningFlag::set(&self.running);

        info!(%source, "Backup cycle started");
        let result = self.orchestrator.run_backup_cycle().await;
        self.report(source, &result);

        *self.last_result.lock() = Some(result.clone());
        TriggerOutcome::Completed(result)
    }

    /// Whether a cycle is in flight
    ///
    /// Reads a flag only. Probing the lock here would make a concurrent
    /// trigger see it held and drop itself.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Refuse all further triggers
    pub fn stop_accepting(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Wait for the in-flight cycle (if any) to return
    ///
    /// Returns false if `timeout` elapsed first.
    pub async fn drain(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.lock.lock()).await.is_ok()
    }

    /// Result of the most recent completed cycle
    pub fn last_result(&self) -> Option<BackupCycleResult> {
        self.last_result.lock().clone()
    }

    fn report(&self, source: TriggerSource, result: &BackupCycleResult) {
        match result.error {
            Some(ref err) => {
                warn!(%source, error = %err, "Backup cycle failed");
                self.notifier.error("Vault Backup Failed", &err.to_string());
            }
            None if result.backup_created => {
                self.notifier.success(
                    "Vault Backup Complete",
                    &format!("Committed and backed up: {}", result.changes_summary),
                );
            }
            None => {
                debug!(%source, summary = %result.changes_summary, "Backup cycle created no snapshot");
            }
        }
    }
}

/// Marks a cycle in flight until dropped, including on cancellation
struct RunningFlag<'a>(&'a AtomicBool);

impl<'a> RunningFlag<'a> {
    fn set(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl CycleTrigger for BackupGuard {
    async fn fire(&self, source: TriggerSource) {
        match self.try_run(source).await {
            TriggerOutcome::Completed(_) => {}
            TriggerOutcome::Busy => info!(%source, "Skipped trigger, backup already in progress"),
            TriggerOutcome::ShuttingDown => debug!(%source, "Skipped trigger, shutting down"),
        }
    }
}
