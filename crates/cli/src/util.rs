//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use vault_core::Settings;

/// Timeout for requests to the local daemon
const DAEMON_TIMEOUT: Duration = Duration::from_secs(5);

/// Base URL of the running daemon's HTTP server
///
/// A wildcard bind address is reached through loopback.
pub fn daemon_url(settings: &Settings) -> String {
    let host = match settings.health_bind.as_str() {
        "0.0.0.0" | "" => "127.0.0.1",
        "::" => "[::1]",
        other => other,
    };
    format!("http://{}:{}", host, settings.health_port)
}

/// HTTP client for talking to the daemon
///
/// `timeout` of `None` uses the short default; manual triggers wait for a
/// whole backup cycle.
pub fn daemon_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout.unwrap_or(DAEMON_TIMEOUT))
        .build()
        .context("Failed to build HTTP client")
}

/// Format timestamp as relative time ("2 hours ago")
pub fn format_relative_time(at: DateTime<Utc>) -> String {
    let Ok(elapsed) = (Utc::now() - at).to_std() else {
        return "in the future".to_string();
    };

    let seconds = elapsed.as_secs();
    if seconds < 60 {
        format!("{} seconds ago", seconds)
    } else if seconds < 3600 {
        format!("{} minutes ago", seconds / 60)
    } else if seconds < 86400 {
        format!("{} hours ago", seconds / 3600)
    } else if seconds < 604800 {
        format!("{} days ago", seconds / 86400)
    } else {
        format!("{} weeks ago", seconds / 604800)
    }
}

/// Format an optional marker ("never" when unset)
pub fn format_marker(at: Option<DateTime<Utc>>) -> String {
    match at {
        Some(at) => format!(
            "{} ({})",
            at.format("%Y-%m-%d %H:%M:%S UTC"),
            format_relative_time(at)
        ),
        None => "never".to_string(),
    }
}

/// Shorten an ISO 8601 timestamp from git or restic for table output
pub fn format_iso_short(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => at.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
