//! Show backup state and daemon liveness

use crate::context;
use crate::locks::DaemonLock;
use crate::util;
use anyhow::Result;
use chrono::DateTime;
use owo_colors::OwoColorize;
use serde::Deserialize;
use vault_core::Settings;

/// Subset of the daemon's `/health` body shown here
#[derive(Debug, Deserialize)]
struct DaemonHealth {
    uptime_seconds: u64,
    dry_run: bool,
    backup_running: bool,
    last_result: Option<LastResult>,
}

#[derive(Debug, Deserialize)]
struct LastResult {
    success: bool,
    changes_summary: String,
    error: Option<serde_json::Value>,
}

pub async fn run(settings: &Settings) -> Result<()> {
    // 1. Persisted markers (readable without the daemon)
    let state = context::load_state(settings)?.snapshot();

    // 2. Lock holder
    let holder = DaemonLock::holder(&settings.state_dir);

    // 3. Live view, if the daemon answers
    let health = fetch_health(settings).await;

    // 4. Display output
    println!("{}", "Vault Backup Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    println!(
        "Vault:         {}",
        settings.vault_path.display().to_string().cyan()
    );
    if let Some(repo) = settings.redacted_repository() {
        println!("Repository:    {}", repo.dimmed());
    }
    println!();

    print!("Daemon:        ");
    match (&holder, &health) {
        (_, Some(health)) => {
            println!("{}", "Running ✓".green());
            if let Some(lock) = &holder {
                println!("  PID:         {}", lock.pid);
            }
            println!("  Uptime:      {} seconds", health.uptime_seconds);
            if health.dry_run {
                println!("  Mode:        {}", "dry run".yellow());
            }
            if health.backup_running {
                println!("  Backup:      {}", "in progress".cyan());
            }
        }
        (Some(lock), None) => {
            println!("{}", "Running (HTTP unreachable)".yellow());
            println!("  PID:         {}", lock.pid);
            if let Some(started) = DateTime::from_timestamp_millis(lock.started_at) {
                println!("  Started:     {}", util::format_relative_time(started));
            }
        }
        (None, None) => {
            println!("{}", "Not running".yellow());
            println!("  {}", "Tip: Start with 'vault-backup run'".dimmed());
        }
    }
    println!();

    println!("Changes:");
    let pending = if state.pending {
        "yes".yellow().to_string()
    } else {
        "no".green().to_string()
    };
    println!("  Pending:     {}", pending);
    println!("  Last change: {}", util::format_marker(state.last_change_at));
    println!("  Last commit: {}", util::format_marker(state.last_commit_at));
    println!("  Last backup: {}", util::format_marker(state.last_backup_at));
    println!();

    if let Some(last) = health.and_then(|h| h.last_result) {
        println!("Last cycle:");
        if last.success {
            println!("  {} {}", "✓".green(), last.changes_summary);
        } else {
            let detail = last
                .error
                .as_ref()
                .and_then(|e| e.get("detail"))
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            println!("  {} {}", "✗".red(), detail);
        }
        println!();
    }

    if state.pending && state.backup_is_stale(chrono::Utc::now(), settings.backup_interval()) {
        println!(
            "{}",
            "Note: pending changes are older than the backup interval".dimmed()
        );
    }

    Ok(())
}

async fn fetch_health(settings: &Settings) -> Option<DaemonHealth> {
    let client = util::daemon_client(None).ok()?;
    let url = format!("{}/health", util::daemon_url(settings));
    let response = client.get(&url).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    response.json().await.ok()
}
