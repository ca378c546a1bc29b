//! Debounce/coalescing scheduler
//!
//! Turns a stream of change signals into discrete backup cycles:
//! ```text
//! Idle    --signal-->  Waiting (arm timer)
//! Waiting --signal-->  Waiting (re-arm: quiet period restarts)
//! Waiting --expiry-->  Firing  --cycle returns--> Idle
//! ```
//! There is exactly one timer, owned by the scheduler task. Signals that
//! arrive while a cycle is firing stay queued in the channel and re-arm the
//! timer once the cycle returns, so no change is lost.

use crate::ChangeSignal;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Who asked for a backup cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Quiet period elapsed after vault changes
    Debounce,
    /// Staleness bound reached while changes are pending
    Periodic,
    /// CLI or HTTP request
    Manual,
    /// Uncommitted changes found at startup
    Startup,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerSource::Debounce => "debounce",
            TriggerSource::Periodic => "periodic",
            TriggerSource::Manual => "manual",
            TriggerSource::Startup => "startup",
        };
        f.write_str(name)
    }
}

/// Something that runs a backup cycle when fired
///
/// Implementations must not block the caller indefinitely when a cycle is
/// already running; the guard drops overlapping triggers.
#[async_trait]
pub trait CycleTrigger: Send + Sync {
    async fn fire(&self, source: TriggerSource);
}

/// Debounce/coalescing scheduler
pub struct DebounceScheduler {
    /// Quiet period that must elapse with zero signals
    quiet: Duration,

    signals: mpsc::Receiver<ChangeSignal>,

    trigger: Arc<dyn CycleTrigger>,

    /// Flips to true on process shutdown
    shutdown: watch::Receiver<bool>,
}

impl DebounceScheduler {
    pub fn new(
        quiet: Duration,
        signals: mpsc::Receiver<ChangeSignal>,
        trigger: Arc<dyn CycleTrigger>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            quiet,
            signals,
            trigger,
            shutdown,
        }
    }

    /// Run the scheduler loop until shutdown
    ///
    /// An armed timer is cancelled without firing on shutdown. If the signal
    /// channel closes, an armed timer still fires before the loop exits.
    pub async fn run(mut self) {
        let timer = sleep(self.quiet);
        tokio::pin!(timer);

        let mut armed = false;
        let mut signals_open = true;

        info!(quiet_seconds = self.quiet.as_secs(), "Debounce scheduler started");

        loop {
            if !signals_open && !armed {
                debug!("Signal channel closed, scheduler exiting");
                break;
            }

            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut self.shutdown) => {
                    if armed {
                        info!("Shutdown requested, cancelling armed debounce timer");
                    }
                    break;
                }

                signal = self.signals.recv(), if signals_open => match signal {
                    Some(signal) => {
                        // Idle/Waiting -> Waiting
                        timer.as_mut().reset(Instant::now() + self.quiet);
                        if !armed {
                            debug!(at = %signal.at, "Change detected, debounce timer armed");
                        }
                        armed = true;
                    }
                    None => signals_open = false,
                },

                _ = &mut timer, if armed => {
                    // Waiting -> Firing -> Idle
                    armed = false;
                    info!("Quiet period elapsed, starting backup cycle");
                    self.trigger.fire(TriggerSource::Debounce).await;
                }
            }
        }

        info!("Debounce scheduler stopped");
    }
}

/// Resolve once the shutdown flag is set (or its sender is gone)
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
