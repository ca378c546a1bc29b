//! Fire-and-forget notifications
//!
//! Delivery runs on spawned tasks so a slow or failing provider never delays
//! or fails a backup cycle. Failures are logged and dropped.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vault_core::{NotifyLevel, NotifySettings};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned HTTP {status}")]
    Status { provider: &'static str, status: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub severity: Severity,
}

/// A notification delivery channel
#[async_trait]
pub trait NotifyProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Generic JSON webhook
pub struct WebhookProvider {
    client: reqwest::Client,
    url: String,
}

impl WebhookProvider {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotifyProvider for WebhookProvider {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Status {
                provider: self.name(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// ntfy.sh (or self-hosted ntfy) topic
pub struct NtfyProvider {
    client: reqwest::Client,
    url: String,
}

impl NtfyProvider {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl NotifyProvider for NtfyProvider {
    fn name(&self) -> &'static str {
        "ntfy"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let (priority, tags) = match notification.severity {
            Severity::Success => ("default", "white_check_mark"),
            Severity::Error => ("high", "warning"),
        };

        let response = self
            .client
            .post(&self.url)
            .header("Title", notification.title.as_str())
            .header("Priority", priority)
            .header("Tags", tags)
            .body(notification.body.clone())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Status {
                provider: self.name(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

/// Level-filtered fan-out to all configured providers
#[derive(Clone)]
pub struct Notifier {
    level: NotifyLevel,
    providers: Vec<Arc<dyn NotifyProvider>>,
}

impl Notifier {
    pub fn new(level: NotifyLevel, providers: Vec<Arc<dyn NotifyProvider>>) -> Self {
        Self { level, providers }
    }

    /// Notifier that never sends anything
    pub fn disabled() -> Self {
        Self::new(NotifyLevel::None, Vec::new())
    }

    pub fn from_settings(settings: &NotifySettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build notification HTTP client, using defaults");
                reqwest::Client::new()
            });

        let mut providers: Vec<Arc<dyn NotifyProvider>> = Vec::new();
        if let Some(url) = settings.webhook_url.as_deref().filter(|u| !u.is_empty()) {
            providers.push(Arc::new(WebhookProvider::new(client.clone(), url)));
        }
        if let Some(url) = settings.ntfy_url.as_deref().filter(|u| !u.is_empty()) {
            providers.push(Arc::new(NtfyProvider::new(client, url)));
        }

        Self::new(settings.level, providers)
    }

    pub fn level(&self) -> NotifyLevel {
        self.level
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Success notification (level `all` only)
    pub fn success(&self, title: &str, body: &str) -> Vec<JoinHandle<()>> {
        if self.level != NotifyLevel::All {
            return Vec::new();
        }
        self.dispatch(Notification {
            title: title.to_string(),
            body: body.to_string(),
            severity: Severity::Success,
        })
    }

    /// Error notification (levels `all` and `errors`)
    pub fn error(&self, title: &str, body: &str) -> Vec<JoinHandle<()>> {
        if self.level == NotifyLevel::None {
            return Vec::new();
        }
        self.dispatch(Notification {
            title: title.to_string(),
            body: body.to_string(),
            severity: Severity::Error,
        })
    }

    fn dispatch(&self, notification: Notification) -> Vec<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(title = %notification.title, "No async runtime, dropping notification");
            return Vec::new();
        };

        self.providers
            .iter()
            .map(|provider| {
                let provider = provider.clone();
                let notification = notification.clone();
                runtime.spawn(async move {
                    match provider.send(&notification).await {
                        Ok(()) => debug!(provider = provider.name(), "Notification delivered"),
                        Err(e) => warn!(
                            provider = provider.name(),
                            error = %e,
                            "Notification delivery failed"
                        ),
                    }
                })
            })
            .collect()
    }
}
