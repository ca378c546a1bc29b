//! Sidecar lifecycle
//!
//! Startup order matters: nothing watches the vault until git is ready and
//! the daemon lock is held, and the HTTP server outlives the drain so
//! `/ready` can report shutdown while the last cycle finishes.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vault_backup_core::Notifier;
use vault_core::{validate_vault, Settings, StateStore};
use vault_vcs::{Git, Restic, VersionControl};
use vault_watcher::{
    signal_channel, CycleTrigger, DebounceScheduler, EventFilter, IgnoreRules, PeriodicTrigger,
    TriggerSource, VaultWatcher,
};

use crate::context::{self, AppContext};
use crate::http_server;
use crate::locks::DaemonLock;

/// Watcher -> scheduler channel depth; excess signals coalesce
const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// How long background tasks get to exit after the drain
const TASK_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the sidecar until SIGINT/SIGTERM
pub async fn run(settings: Settings) -> Result<()> {
    // 1. Validate before touching anything
    settings.validate().context("Invalid configuration")?;
    validate_vault(&settings.vault_path).context("Vault is not usable")?;

    info!(
        vault = %settings.vault_path.display(),
        state_dir = %settings.state_dir.display(),
        repository = settings.redacted_repository().as_deref().unwrap_or("<unset>"),
        dry_run = settings.dry_run,
        "Starting vault backup sidecar"
    );

    // 2. State and single-instance lock
    let state = Arc::new(
        StateStore::open(&settings.state_dir).context("Failed to open state directory")?,
    );
    let lock = DaemonLock::acquire(&settings.state_dir)?;

    // 3. External tools
    let git = Arc::new(Git::from_settings(&settings));
    if git
        .init_repository()
        .await
        .context("Failed to initialize git repository in vault")?
    {
        info!("Initialized new git repository in vault");
    }

    let restic = Arc::new(Restic::from_settings(&settings));
    if settings.dry_run {
        info!("Dry run: skipping restic repository check");
    } else if let Err(e) = restic.check_repository().await {
        warn!(error = %e, "Could not reach restic repository, continuing with local commits");
    }

    // 4. Explicit context shared by every component
    let ctx = Arc::new(AppContext::new(
        settings.clone(),
        state.clone(),
        git.clone(),
        restic,
        Notifier::from_settings(&settings.notify),
        context::summarizer(&settings),
    ));
    let trigger: Arc<dyn CycleTrigger> = ctx.guard.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (http_stop_tx, http_stop_rx) = watch::channel(false);

    // 5. Change detection
    let (signals, signals_rx) = signal_channel(SIGNAL_CHANNEL_CAPACITY);
    let rules = IgnoreRules::load(&settings.vault_path, settings.ignore.clone())
        .context("Failed to load ignore rules")?;
    info!(sources = rules.active_sources(), "Ignore rules loaded");
    let watcher = VaultWatcher::start(
        &settings.vault_path,
        EventFilter::new(rules, state.clone(), signals),
    )
    .context("Failed to start vault watcher")?;

    // 6. Scheduler and periodic trigger
    let scheduler = tokio::spawn(
        DebounceScheduler::new(
            settings.debounce(),
            signals_rx,
            trigger.clone(),
            shutdown_rx.clone(),
        )
        .run(),
    );
    let periodic = tokio::spawn(
        PeriodicTrigger::new(
            state.clone(),
            settings.tick_interval(),
            settings.backup_interval(),
            trigger.clone(),
            shutdown_rx.clone(),
        )
        .run(),
    );

    // 7. HTTP server
    let listener = TcpListener::bind((settings.health_bind.as_str(), settings.health_port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind HTTP server on {}:{}",
                settings.health_bind, settings.health_port
            )
        })?;
    let server = tokio::spawn(http_server::serve(
        listener,
        ctx.clone(),
        wait_for_flag(http_stop_rx),
    ));

    // 8. Catch up on edits made while we were down
    let startup = match git.has_uncommitted_changes().await {
        Ok(true) => {
            info!("Uncommitted changes found at startup, scheduling catch-up backup");
            if let Err(e) = state.mark_pending() {
                warn!(error = %e, "Failed to persist pending marker");
            }
            let trigger = trigger.clone();
            Some(tokio::spawn(async move {
                trigger.fire(TriggerSource::Startup).await;
            }))
        }
        Ok(false) => None,
        Err(e) => {
            warn!(error = %e, "Could not check for uncommitted changes at startup");
            None
        }
    };

    ctx.guard.notifier().success(
        "Vault Backup Online",
        &format!(
            "Watching `{}` (debounce: {}s)",
            settings.vault_path.display(),
            settings.debounce_seconds
        ),
    );
    info!(
        debounce_seconds = settings.debounce_seconds,
        port = settings.health_port,
        "Sidecar running"
    );

    // 9. Wait for a termination signal
    wait_for_termination().await?;
    info!("Shutdown requested");

    // 10. Stop triggers, cancel the armed timer, drain the in-flight cycle
    ctx.guard.stop_accepting();
    let _ = shutdown_tx.send(true);
    drop(watcher);

    if ctx.guard.drain(settings.shutdown_timeout()).await {
        info!("No backup cycle in flight");
    } else {
        warn!(
            timeout_seconds = settings.shutdown_timeout_seconds,
            "Backup cycle still running at shutdown timeout, exiting anyway"
        );
    }

    let mut tasks = vec![scheduler, periodic];
    tasks.extend(startup);
    for task in tasks {
        join_or_abort(task).await;
    }

    let _ = http_stop_tx.send(true);
    match tokio::time::timeout(TASK_EXIT_TIMEOUT, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server task panicked"),
        Err(_) => warn!("HTTP server did not stop in time"),
    }

    lock.release()?;
    info!("Sidecar stopped");
    Ok(())
}

/// Resolve once the flag flips to true (or the sender is gone)
async fn wait_for_flag(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn join_or_abort(task: JoinHandle<()>) {
    let abort = task.abort_handle();
    if tokio::time::timeout(TASK_EXIT_TIMEOUT, task).await.is_err() {
        warn!("Background task did not exit in time, aborting");
        abort.abort();
    }
}

async fn wait_for_termination() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
