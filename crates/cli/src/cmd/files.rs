//! List files in a snapshot

use crate::context;
use crate::util;
use anyhow::{anyhow, Context, Result};
use owo_colors::OwoColorize;
use vault_core::Settings;

pub async fn run(settings: &Settings, snapshot: &str, path: Option<&str>) -> Result<()> {
    let services = context::browsing_services(settings);

    let entries = services
        .restic()
        .list_files(snapshot, path)
        .await
        .context("Failed to list snapshot contents")?
        .ok_or_else(|| anyhow!("Snapshot not found: {}", snapshot))?;

    if entries.is_empty() {
        println!("{}", "No entries".dimmed());
        return Ok(());
    }

    for entry in &entries {
        match entry.kind.as_str() {
            "dir" => println!("{:>10}  {}/", "", entry.path.blue()),
            _ => println!(
                "{:>10}  {}",
                util::format_size(entry.size).dimmed(),
                entry.path
            ),
        }
    }

    let files = entries.iter().filter(|e| e.kind == "file").count();
    println!();
    println!("{} files, {} entries", files, entries.len());

    Ok(())
}
