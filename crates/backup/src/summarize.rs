//! Commit message generation
//!
//! The deterministic template is always available. An optional LLM
//! summarizer (any OpenAI-compatible `/chat/completions` endpoint) can replace
//! it; any failure there falls back to the template.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use vault_core::LlmSettings;
use vault_vcs::{ChangeKind, FileChange};

/// Paths listed in a template commit body
const MAX_LISTED_PATHS: usize = 50;

/// Changes included in an LLM prompt
const MAX_PROMPT_CHANGES: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("summarizer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("summarizer returned HTTP {0}")]
    Status(u16),

    #[error("summarizer returned no content")]
    Empty,
}

/// Produces a commit message for a set of changes
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, changes: &[FileChange]) -> Result<String, SummarizeError>;
}

/// Commit message from the summarizer, or the template on failure
pub async fn commit_message(summarizer: Option<&dyn Summarizer>, changes: &[FileChange]) -> String {
    let Some(summarizer) = summarizer else {
        return template_message(changes);
    };

    match summarizer.summarize(changes).await {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Commit summarizer failed, using template message");
            template_message(changes)
        }
    }
}

/// Deterministic commit message listing changed-file counts by type
///
/// ```text
/// vault backup: 3 files changed (1 added, 2 modified)
///
/// - notes/a.md
/// - notes/b.md
/// - notes/c.md
/// ```
pub fn template_message(changes: &[FileChange]) -> String {
    let mut message = template_subject(changes);

    if !changes.is_empty() {
        message.push('\n');
        for change in changes.iter().take(MAX_LISTED_PATHS) {
            message.push_str("\n- ");
            message.push_str(&change.path);
        }
        if changes.len() > MAX_LISTED_PATHS {
            message.push_str(&format!("\n... and {} more", changes.len() - MAX_LISTED_PATHS));
        }
    }

    message
}

/// First line of the template message
pub fn template_subject(changes: &[FileChange]) -> String {
    let count = |kind: ChangeKind| changes.iter().filter(|c| c.kind == kind).count();
    let parts: Vec<String> = [
        (ChangeKind::Added, "added"),
        (ChangeKind::Modified, "modified"),
        (ChangeKind::Deleted, "deleted"),
        (ChangeKind::Renamed, "renamed"),
    ]
    .into_iter()
    .filter_map(|(kind, label)| match count(kind) {
        0 => None,
        n => Some(format!("{} {}", n, label)),
    })
    .collect();

    let noun = if changes.len() == 1 { "file" } else { "files" };
    if parts.is_empty() {
        format!("vault backup: {} {} changed", changes.len(), noun)
    } else {
        format!(
            "vault backup: {} {} changed ({})",
            changes.len(),
            noun,
            parts.join(", ")
        )
    }
}

/// LLM-backed summarizer
pub struct LlmSummarizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl LlmSummarizer {
    pub fn new(settings: &LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build summarizer HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            endpoint: format!("{}/chat/completions", settings.api_url.trim_end_matches('/')),
            api_key: settings.api_key.clone().filter(|k| !k.trim().is_empty()),
            model: settings.model.clone(),
        }
    }

    fn prompt(changes: &[FileChange]) -> String {
        let mut prompt = String::from(
            "Write a git commit message for these changes to a personal notes vault. \
             Use a subject line of at most 72 characters, optionally followed by a blank \
             line and a short body. Reply with the message only.\n\nChanges:\n",
        );
        for change in changes.iter().take(MAX_PROMPT_CHANGES) {
            prompt.push_str(&format!("{:?} {}\n", change.kind, change.path));
        }
        if changes.len() > MAX_PROMPT_CHANGES {
            prompt.push_str(&format!("... and {} more\n", changes.len() - MAX_PROMPT_CHANGES));
        }
        prompt
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, changes: &[FileChange]) -> Result<String, SummarizeError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": Self::prompt(changes)}
            ]
        });

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SummarizeError::Status(status.as_u16()));
        }

        let body: serde_json::Value = response.json().await?;
        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(|content| content.trim().trim_matches('`').trim())
            .filter(|content| !content.is_empty())
            .ok_or(SummarizeError::Empty)?;

        debug!(model = %self.model, "Generated commit message");
        Ok(content.to_string())
    }
}
