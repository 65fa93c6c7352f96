//! Operator notifications
//!
//! Notifications are fire-and-forget: the pipeline never waits on delivery
//! semantics and never fails because a webhook is down. The webhook sink
//! makes two extra delivery attempts before logging the message and moving
//! on.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyLevel {
    Info,
    Warn,
    Error,
}

/// One operator-facing message
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotifyLevel,
    pub title: String,
    pub text: String,
    /// Structured key/value pairs, e.g. per-channel collection counts
    pub fields: Vec<(String, String)>,
}

impl Notification {
    pub fn new(level: NotifyLevel, title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            text: text.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

/// Delivery target for operator notifications
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a notification. Must never propagate delivery failures.
    async fn notify(&self, notification: Notification);
}

/// Sink that posts notifications to a configured webhook URL
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
}

// First try plus this many redeliveries
const EXTRA_ATTEMPTS: usize = 2;

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::error::Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), String> {
        let response = self
            .http
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("webhook returned {}", response.status()))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn notify(&self, notification: Notification) {
        for attempt in 0..=EXTRA_ATTEMPTS {
            match self.deliver(&notification).await {
                Ok(()) => return,
                Err(reason) if attempt < EXTRA_ATTEMPTS => {
                    warn!(attempt = attempt + 1, reason = %reason, "Webhook delivery failed, retrying");
                }
                Err(reason) => {
                    error!(
                        title = %notification.title,
                        reason = %reason,
                        "Webhook delivery failed, dropping notification"
                    );
                }
            }
        }
    }
}

/// Sink that drops everything; for deployments without a webhook
#[derive(Default)]
pub struct NoopSink;

#[async_trait]
impl NotificationSink for NoopSink {
    async fn notify(&self, _notification: Notification) {}
}
