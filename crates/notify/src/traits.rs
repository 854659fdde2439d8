//! Notifier trait definition and shared error types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ccp_core::{Severity, TransitionKind};

/// Errors that can occur during alert rendering or delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("IO error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A rendered alert ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub subject: String,
    pub body: String,
    pub transition: TransitionKind,
    pub severity: Severity,
    pub event_id: String,
    /// When the transition happened: confirmation sample for `opened`,
    /// `end_time` for `resolved`.
    pub at: DateTime<Utc>,
    /// Additional metadata (tag, rule, process).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Trait for alert channel implementations.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert through this channel.
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "log", "report").
    fn channel_name(&self) -> &str;
}

/// Result of dispatching an alert to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub event_id: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
