//! Notifier trait definition and shared error types.

use std::collections::HashMap;

/// Errors that can occur during notice delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template directory unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Delivery failed on every channel: {0}")]
    Undelivered(String),

    #[error("No notification channels configured")]
    NoChannels,
}

/// A rendered notice ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// The rendered subject line.
    pub subject: String,
    /// The rendered body.
    pub body: String,
    /// Primary recipients. Channels without addressing ignore this.
    pub recipients: Vec<String>,
    /// Additional metadata (notice kind, quota subject).
    pub metadata: HashMap<String, String>,
}

/// Trait for notice channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notice through this channel.
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "webhook", "email").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching a notice to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub subject_key: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
