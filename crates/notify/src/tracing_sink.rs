//! Notifier that writes alerts to the log.

use ccp_core::TransitionKind;

use crate::traits::{Alert, Notifier, NotifyError};

/// Logs `opened` alerts at warn and `resolved` alerts at info.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for TracingNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let tag_id = alert.metadata.get("tag_id").map(String::as_str).unwrap_or("");
        match alert.transition {
            TransitionKind::Opened => tracing::warn!(
                event_id = %alert.event_id,
                tag_id,
                severity = %alert.severity,
                at = %alert.at,
                body = %alert.body,
                "{}",
                alert.subject
            ),
            TransitionKind::Resolved => tracing::info!(
                event_id = %alert.event_id,
                tag_id,
                at = %alert.at,
                body = %alert.body,
                "{}",
                alert.subject
            ),
        }
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
