//! Ask the running daemon for a backup cycle now

use crate::util;
use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use reqwest::StatusCode;
use std::time::Duration;
use vault_backup_core::BackupCycleResult;
use vault_core::Settings;

/// Slack on top of the worst-case cycle for HTTP and state writes
const TRIGGER_SLACK: Duration = Duration::from_secs(30);

pub async fn run(settings: &Settings) -> Result<()> {
    let timeout = settings.cycle_timeout() + TRIGGER_SLACK;
    let client = util::daemon_client(Some(timeout))?;
    let url = format!("{}/backup", util::daemon_url(settings));

    let response = client
        .post(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach daemon at {} (is it running?)", url))?;

    match response.status() {
        StatusCode::OK => {}
        StatusCode::CONFLICT => {
            println!("{}", "A backup cycle is already in progress".yellow());
            return Ok(());
        }
        StatusCode::SERVICE_UNAVAILABLE => bail!("Daemon is shutting down"),
        status => bail!("Daemon returned {}", status),
    }

    let result: BackupCycleResult = response
        .json()
        .await
        .context("Failed to parse backup result")?;

    if !result.success {
        let detail = result
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Backup failed: {}", detail);
    }

    println!("{} {}", "✓".green(), result.changes_summary);
    if let Some(commit) = &result.commit {
        println!("  Commit:   {}", commit.chars().take(12).collect::<String>().yellow());
    }
    if let Some(snapshot) = &result.snapshot_id {
        println!("  Snapshot: {}", snapshot.cyan());
    }
    println!("  Took:     {} ms", result.duration_ms);

    Ok(())
}
