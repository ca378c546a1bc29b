//! Show commit history

use crate::context;
use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use vault_core::Settings;
use vault_vcs::vault_relative;

pub async fn run(settings: &Settings, file: Option<&str>, count: usize) -> Result<()> {
    let services = context::browsing_services(settings);
    let count = count.max(1);

    let commits = match file {
        Some(file) => {
            let relative = vault_relative(&settings.vault_path, file)?;
            services
                .git()
                .file_history(&relative.to_string_lossy(), count)
                .await
                .context("Failed to read file history")?
        }
        None => services
            .git()
            .log(count)
            .await
            .context("Failed to read commit log")?,
    };

    if commits.is_empty() {
        println!("{}", "No commits yet".dimmed());
        return Ok(());
    }

    for commit in &commits {
        println!(
            "{}  {}  {}",
            commit.short_hash.yellow(),
            util::format_iso_short(&commit.date).dimmed(),
            commit.message
        );
    }

    Ok(())
}
