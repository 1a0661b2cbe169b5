// ABOUTME: Best-effort fan-out of outcome events to configured channels.
// ABOUTME: Channel failures are logged and reported, never returned as errors.

mod command;
mod webhook;

pub use command::CommandChannel;
pub use webhook::WebhookChannel;

use crate::config::{ChannelConfig, NotifyConfig};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How loud an event is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One outcome event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(severity: Severity, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            severity,
            timestamp: Utc::now(),
        }
    }

    pub fn info(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Info, subject, body)
    }

    pub fn warning(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Warning, subject, body)
    }

    pub fn critical(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(Severity::Critical, subject, body)
    }
}

/// A delivery failure on one channel.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("command exited with {code:?}: {stderr}")]
    Command { code: Option<i32>, stderr: String },

    #[error("HTTP {0}")]
    Status(u16),

    #[error("{0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A place events are delivered to.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Short label used in logs and reports.
    fn label(&self) -> String;

    async fn deliver(&self, event: &Event) -> std::result::Result<(), NotifyError>;
}

/// Emits events through the process log.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl Channel for LogChannel {
    fn label(&self) -> String {
        "log".to_string()
    }

    async fn deliver(&self, event: &Event) -> std::result::Result<(), NotifyError> {
        match event.severity {
            Severity::Info => tracing::info!(subject = %event.subject, "{}", event.body),
            Severity::Warning => tracing::warn!(subject = %event.subject, "{}", event.body),
            Severity::Critical => tracing::error!(subject = %event.subject, "{}", event.body),
        }
        Ok(())
    }
}

/// What happened to one event.
#[derive(Debug, Default)]
pub struct NotifyReport {
    pub delivered: Vec<String>,
    /// `(channel, reason)` for every channel that failed.
    pub failed: Vec<(String, String)>,
}

impl NotifyReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans events out to every channel concurrently.
#[derive(Clone)]
pub struct NotificationSink {
    channels: Vec<Arc<dyn Channel>>,
    timeout: Duration,
}

impl NotificationSink {
    pub fn new(channels: Vec<Arc<dyn Channel>>, timeout: Duration) -> Self {
        Self { channels, timeout }
    }

    /// A sink with no channels.
    pub fn disabled() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    /// Build channels from configuration, resolving webhook URLs now.
    pub fn from_config(config: &NotifyConfig) -> Result<Self> {
        let mut channels: Vec<Arc<dyn Channel>> = Vec::new();
        for channel in &config.channels {
            match channel {
                ChannelConfig::Log => channels.push(Arc::new(LogChannel)),
                ChannelConfig::Command { path } => {
                    channels.push(Arc::new(CommandChannel::new(path.clone())))
                }
                ChannelConfig::Webhook { url } => {
                    channels.push(Arc::new(WebhookChannel::new(&url.resolve()?)?))
                }
            }
        }
        Ok(Self::new(channels, config.timeout))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Deliver `event` to every channel at most once. Never fails.
    pub async fn notify(&self, event: &Event) -> NotifyReport {
        let deliveries = self.channels.iter().map(|channel| async move {
            let label = channel.label();
            let result = match tokio::time::timeout(self.timeout, channel.deliver(event)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::Timeout(self.timeout)),
            };
            (label, result)
        });

        let mut report = NotifyReport::default();
        for (label, result) in futures::future::join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered.push(label),
                Err(e) => {
                    tracing::warn!(channel = %label, error = %e, subject = %event.subject, "NotificationFailed");
                    report.failed.push((label, e.to_string()));
                }
            }
        }
        report
    }
}
