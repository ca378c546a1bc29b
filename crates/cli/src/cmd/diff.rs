//! Diff a historical version against the working copy

use crate::context;
use crate::diff_utils;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use vault_core::Settings;
use vault_vcs::in_place_target;

pub async fn run(settings: &Settings, source: &str, path: &str, context_lines: usize) -> Result<()> {
    let services = context::browsing_services(settings);

    // 1. Historical version
    let fetched = services.fetch(source, path).await?;

    // 2. Working copy (a deleted file diffs against empty)
    let working_path = in_place_target(&settings.vault_path, path)?;
    let working = match tokio::fs::read(&working_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", working_path.display()))
        }
    };

    if diff_utils::is_binary(&fetched.content) || diff_utils::is_binary(&working) {
        if fetched.content == working {
            println!("{}", "Binary files are identical".dimmed());
        } else {
            println!("Binary files differ");
        }
        return Ok(());
    }

    // 3. Render
    let old_label = format!("{}@{}", fetched.path.display(), fetched.source);
    let new_label = format!("{} (working copy)", fetched.path.display());

    let diff = diff_utils::generate_unified_diff(
        &fetched.content,
        &working,
        &old_label,
        &new_label,
        context_lines,
        true,
    );

    if diff.is_empty() {
        println!(
            "{}",
            format!("No changes since {} {}", fetched.origin.label(), fetched.source).dimmed()
        );
    } else {
        print!("{}", diff);
    }

    Ok(())
}
