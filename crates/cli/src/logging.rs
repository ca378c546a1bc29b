//! Tracing subscriber setup
//!
//! The daemon logs JSON to stdout (and optionally to a daily-rolling file);
//! browsing commands log human-readable lines to stderr so stdout stays
//! clean for their output. `RUST_LOG` overrides both defaults.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};
use vault_core::Settings;

/// Default daemon directives; notify is chatty at info
const DAEMON_DIRECTIVES: &str = "info,notify=warn";

const LOG_FILE_PREFIX: &str = "vault-backup.log";

fn filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn cli_directives(verbose: bool) -> &'static str {
    if verbose {
        "debug,notify=warn"
    } else {
        "warn"
    }
}

/// Initialize daemon logging
///
/// The returned guard flushes the file writer and must live as long as the
/// process.
pub fn init_daemon(settings: &Settings) -> Result<Option<WorkerGuard>> {
    let stdout_layer = fmt::layer().json().with_current_span(false).with_target(true);

    let (file_layer, guard) = match settings.log_dir {
        Some(ref dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_current_span(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_or(DAEMON_DIRECTIVES))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

/// Initialize logging for one-shot browsing commands
pub fn init_cli(verbose: bool) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .compact();

    // A second init (tests) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter_or(cli_directives(verbose)))
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        for directives in [DAEMON_DIRECTIVES, cli_directives(true), cli_directives(false)] {
            assert!(EnvFilter::try_new(directives).is_ok(), "{directives}");
        }
    }
}
