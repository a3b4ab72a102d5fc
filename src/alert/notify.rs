use async_trait::async_trait;
use std::time::Duration;

use crate::config::NotificationConfig;

use super::types::Alert;

/// Delivery target for raised alerts. Failures never abort ingestion.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> eyre::Result<()>;
}

/// Writes alerts to the log only.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, alert: &Alert) -> eyre::Result<()> {
        tracing::warn!(
            wallet_id = alert.wallet_id,
            alert_id = ?alert.id,
            alert_type = alert.alert_type.as_str(),
            severity = alert.severity.as_str(),
            title = %alert.title,
            message = %alert.message,
            "Alert notification"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: &str, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| eyre::eyre!("Failed to build webhook client: {}", e))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, alert: &Alert) -> eyre::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|e| eyre::eyre!("Webhook request to '{}' failed: {}", self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(eyre::eyre!("Webhook '{}' returned {}", self.url, status));
        }
        Ok(())
    }
}

/// Pick the sink from config: webhook when configured, log otherwise.
pub fn build_sink(config: &NotificationConfig) -> eyre::Result<Box<dyn NotificationSink>> {
    match &config.webhook_url {
        Some(url) => {
            tracing::info!(%url, "Alert notifications go to webhook");
            Ok(Box::new(WebhookSink::new(
                url,
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        None => Ok(Box::new(LogSink)),
    }
}
