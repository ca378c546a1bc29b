//! Print a file as of a commit or snapshot

use crate::context;
use anyhow::Result;
use std::io::Write;
use vault_core::Settings;

/// Raw bytes go to stdout so the output can be piped or redirected
pub async fn run(settings: &Settings, source: &str, path: &str) -> Result<()> {
    let services = context::browsing_services(settings);
    let fetched = services.fetch(source, path).await?;

    tracing::debug!(
        origin = fetched.origin.label(),
        bytes = fetched.content.len(),
        "Fetched historical file"
    );

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&fetched.content)?;
    stdout.flush()?;
    Ok(())
}
