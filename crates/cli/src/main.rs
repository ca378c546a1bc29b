//! vault-backup - backup sidecar for a notes vault

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vault_core::Settings;

mod cmd;
mod context;
mod daemon;
mod diff_utils;
mod http_server;
mod locks;
mod logging;
mod util;

#[cfg(test)]
mod testing;

/// Vault Backup - git history and restic snapshots for your vault
#[derive(Parser)]
#[command(name = "vault-backup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./vault-backup.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging for browsing commands
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup sidecar (watcher, scheduler, HTTP server)
    Run,
    /// Show backup state and daemon liveness
    Status,
    /// Ask the running daemon for a backup cycle now
    Trigger,
    /// List remote snapshots
    Snapshots {
        /// Tag filter (default: configured restic tag)
        #[arg(long)]
        tag: Option<String>,
    },
    /// List files in a snapshot
    Files {
        /// Snapshot ID (or "latest")
        snapshot: String,
        /// Only list entries under this path
        #[arg(long)]
        path: Option<String>,
    },
    /// Show commit history
    Log {
        /// Only commits touching this vault file
        #[arg(long)]
        file: Option<String>,
        /// Number of commits to show (default: 20)
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
    /// Print a file as of a commit or snapshot
    Show {
        /// Commit hash or snapshot ID
        source: String,
        /// Vault-relative or snapshot-absolute path
        path: String,
    },
    /// Restore a file from a commit or snapshot
    Restore {
        /// Commit hash or snapshot ID
        source: String,
        /// Vault-relative or snapshot-absolute path
        path: String,
        /// Write here instead of over the vault file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Diff a historical version against the working copy
    Diff {
        /// Commit hash or snapshot ID
        source: String,
        /// Vault-relative or snapshot-absolute path
        path: String,
        /// Number of context lines (default: 3)
        #[arg(short = 'U', long, default_value = "3")]
        context: usize,
    },
    /// Print the effective configuration (secrets omitted)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Daemon logs are JSON; browsing commands log to stderr only
    let _log_guard = match cli.command {
        Commands::Run => logging::init_daemon(&settings)?,
        _ => {
            logging::init_cli(cli.verbose);
            None
        }
    };

    match cli.command {
        Commands::Run => daemon::run(settings).await,
        Commands::Status => cmd::status::run(&settings).await,
        Commands::Trigger => cmd::trigger::run(&settings).await,
        Commands::Snapshots { tag } => cmd::snapshots::run(&settings, tag.as_deref()).await,
        Commands::Files { snapshot, path } => {
            cmd::files::run(&settings, &snapshot, path.as_deref()).await
        }
        Commands::Log { file, count } => cmd::log::run(&settings, file.as_deref(), count).await,
        Commands::Show { source, path } => cmd::show::run(&settings, &source, &path).await,
        Commands::Restore {
            source,
            path,
            output,
        } => cmd::restore::run(&settings, &source, &path, output.as_deref()).await,
        Commands::Diff {
            source,
            path,
            context,
        } => cmd::diff::run(&settings, &source, &path, context).await,
        Commands::Config => cmd::config::run(&settings),
    }
}
