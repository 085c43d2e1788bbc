//! Report delivery.

use a3s_reaper_core::error::{ReaperError, Result};
use async_trait::async_trait;

/// Destination for the final report.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Posts the report as `{"text": ...}` to an incoming-webhook URL
/// (Slack and compatible chat tools).
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Sink for an optional configured webhook.
    pub fn from_url(url: Option<&str>) -> Option<Self> {
        url.map(Self::new)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, text: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .map_err(|e| ReaperError::NotificationDeliveryFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReaperError::NotificationDeliveryFailure(format!(
                "webhook returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        tracing::debug!(status = status.as_u16(), "Report delivered");
        Ok(())
    }
}
