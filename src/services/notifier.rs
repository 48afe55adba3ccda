//! Outbound notifications.
//!
//! Delivery is fire-and-forget from the caller's point of view: every call
//! site catches the error and logs it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{NotificationConfig, NotificationTransport};

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub recipients: Vec<String>,
    pub html_body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log. Bodies are only visible at debug level.
pub struct LogNotifier {
    sender: String,
}

impl LogNotifier {
    #[must_use]
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(
            sender = %self.sender,
            subject = %notification.subject,
            recipients = notification.recipients.len(),
            "Notification dispatched"
        );
        debug!(body = %notification.html_body, "Notification body");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    sender: &'a str,
    #[serde(flatten)]
    notification: &'a Notification,
}

/// POSTs notifications as JSON to a relay endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    sender: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, sender: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Incidentry/1.0")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            client,
            url: url.into(),
            sender: sender.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let payload = WebhookPayload {
            sender: &self.sender,
            notification,
        };

        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("Failed to reach notification webhook")?
            .error_for_status()
            .context("Notification webhook rejected the message")?;

        debug!(subject = %notification.subject, "Notification delivered to webhook");
        Ok(())
    }
}

/// Drops everything; used when notifications are disabled.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        debug!(subject = %notification.subject, "Notifications disabled, dropping message");
        Ok(())
    }
}

pub fn build_notifier(config: &NotificationConfig) -> Result<Arc<dyn Notifier>> {
    if !config.enabled {
        return Ok(Arc::new(DisabledNotifier));
    }

    match config.transport {
        NotificationTransport::Log => Ok(Arc::new(LogNotifier::new(config.sender.clone()))),
        NotificationTransport::Webhook => {
            let url = config
                .webhook_url
                .clone()
                .context("notifications.webhook_url is required for the webhook transport")?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                config.sender.clone(),
                Duration::from_secs(config.request_timeout_seconds),
            )?))
        }
    }
}

/// Sends and logs any failure. Never fails.
pub async fn deliver(notifier: &dyn Notifier, notification: Notification) {
    if notification.recipients.is_empty() {
        return;
    }

    if let Err(e) = notifier.send(&notification).await {
        warn!(error = ?e, subject = %notification.subject, "Notification delivery failed");
    }
}
