//! Periodic staleness trigger
//!
//! Continuous edits can keep the debounce timer from ever quiescing. This
//! ticker bounds how stale the remote snapshot can get: on every tick it
//! fires a cycle if changes are pending and the last remote snapshot is older
//! than the backup interval. A tick that lands while a cycle is running
//! yields to it (the guard drops the trigger).

use crate::debounce::{wait_for_shutdown, CycleTrigger, TriggerSource};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};
use vault_core::{ChangeState, StateStore};

/// Whether a periodic tick should start a cycle
pub fn should_fire(state: &ChangeState, now: DateTime<Utc>, max_staleness: Duration) -> bool {
    state.pending && state.backup_is_stale(now, max_staleness)
}

/// Periodic staleness trigger
pub struct PeriodicTrigger {
    state: Arc<StateStore>,

    /// Tick interval (default: 5 minutes)
    interval: Duration,

    /// Upper bound on snapshot age while changes are pending
    max_staleness: Duration,

    trigger: Arc<dyn CycleTrigger>,

    shutdown: watch::Receiver<bool>,
}

impl PeriodicTrigger {
    pub fn new(
        state: Arc<StateStore>,
        interval: Duration,
        max_staleness: Duration,
        trigger: Arc<dyn CycleTrigger>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            state,
            interval,
            max_staleness,
            trigger,
            shutdown,
        }
    }

    /// Run the tick loop until shutdown
    ///
    /// The first tick happens one interval after start; startup catch-up is
    /// handled separately by the daemon.
    pub async fn run(mut self) {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_seconds = self.interval.as_secs(),
            max_staleness_seconds = self.max_staleness.as_secs(),
            "Starting periodic staleness check"
        );

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown) => break,

                _ = timer.tick() => {
                    let state = self.state.snapshot();
                    if should_fire(&state, Utc::now(), self.max_staleness) {
                        info!(
                            last_backup = ?state.last_backup_at,
                            "Snapshot is stale with pending changes, starting backup cycle"
                        );
                        self.trigger.fire(TriggerSource::Periodic).await;
                    } else {
                        debug!(pending = state.pending, "Periodic check: nothing to do");
                    }
                }
            }
        }

        info!("Periodic staleness check stopped");
    }
}
