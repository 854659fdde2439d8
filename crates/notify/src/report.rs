//! In-memory alert report, used by historical runs in place of live
//! delivery.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::traits::{Alert, Notifier, NotifyError};

/// Collects alerts in delivery order. Clones share the same report.
#[derive(Debug, Clone, Default)]
pub struct ReportNotifier {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl ReportNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Alert>> {
        // A panic while pushing cannot leave the Vec half-written.
        self.alerts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of every alert collected so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Serialize the report as a pretty JSON array.
    pub fn to_json(&self) -> Result<String, NotifyError> {
        Ok(serde_json::to_string_pretty(&*self.lock())?)
    }

    /// Write the report to `path`.
    pub fn write_json(&self, path: &Path) -> Result<(), NotifyError> {
        let json = self.to_json()?;
        std::fs::write(path, json + "\n").map_err(|source| NotifyError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[async_trait::async_trait]
impl Notifier for ReportNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.lock().push(alert.clone());
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "report"
    }
}
