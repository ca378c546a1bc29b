//! List remote snapshots

use crate::context;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use vault_core::Settings;

pub async fn run(settings: &Settings, tag: Option<&str>) -> Result<()> {
    let services = context::browsing_services(settings);
    let tag = tag.unwrap_or(&settings.restic_tag);

    let snapshots = services
        .restic()
        .list_snapshots(Some(tag))
        .await
        .context("Failed to list snapshots")?;

    if snapshots.is_empty() {
        println!("{}", format!("No snapshots tagged '{}'", tag).dimmed());
        return Ok(());
    }

    println!("{} ({} total)", "Snapshots".bold(), snapshots.len());
    println!();

    // Newest first
    for snapshot in snapshots.iter().rev() {
        println!(
            "{}  {}  {}",
            snapshot.short_id.yellow(),
            util::format_iso_short(&snapshot.time),
            snapshot.tags.join(",").dimmed()
        );
    }

    Ok(())
}
