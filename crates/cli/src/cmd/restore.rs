//! Restore a file from a commit or snapshot

use crate::context;
use anyhow::Result;
use owo_colors::OwoColorize;
use std::path::Path;
use vault_core::Settings;

pub async fn run(
    settings: &Settings,
    source: &str,
    path: &str,
    output: Option<&Path>,
) -> Result<()> {
    let services = context::browsing_services(settings);
    let restored = services.restore(source, path, output).await?;

    println!(
        "{} Restored {} from {} {}",
        "✓".green(),
        restored.path.display().to_string().cyan(),
        restored.origin.label(),
        restored.source.yellow()
    );
    println!("  Written to: {}", restored.target.display());

    if output.is_none() {
        println!(
            "{}",
            "The running daemon will back up the restored file like any other edit".dimmed()
        );
    }

    Ok(())
}
