use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ccp_core::config::RetryConfig;
use ccp_core::Sample;
use ccp_ingest::DataSource;

use crate::error::{EngineError, Result};

use super::retry::with_retry;
use super::{warn_missing_tags, Detector, PendingAlert, RunSummary};

impl Detector {
    /// Replay `[start, end)` in one pass.
    ///
    /// Every tag's range is fetched first; the merged stream is then
    /// replayed without suspending. Alerts go to the dispatcher after the
    /// pass, and the event log is written once at the end.
    pub async fn run_historical(
        &mut self,
        source: &dyn DataSource,
        retry: &RetryConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RunSummary> {
        if start >= end {
            return Err(EngineError::RunWindow(format!(
                "start {start} must be before end {end}"
            )));
        }
        info!(source = source.name(), %start, %end, "historical replay started");

        let mut merged = Vec::new();
        let mut empty = Vec::new();
        for tag_id in self.tag_ids() {
            match with_retry(retry, &tag_id, || source.range(&tag_id, start, end)).await {
                Ok(samples) => {
                    if samples.is_empty() {
                        empty.push(tag_id);
                    }
                    merged.extend(
                        samples
                            .into_iter()
                            .filter(|s| s.timestamp >= start && s.timestamp < end),
                    );
                }
                Err(e) => {
                    warn!(tag_id = %tag_id, error = %e, "data source read failed; tag replays as empty");
                    empty.push(tag_id);
                }
            }
        }
        warn_missing_tags(&empty);

        let pending = self.replay(merged);
        self.flush();
        self.dispatch(pending).await;

        info!(
            samples = self.summary.samples_applied,
            opened = self.summary.events_opened,
            resolved = self.summary.events_resolved,
            events = self.store.len(),
            "historical replay finished"
        );
        Ok(self.summary.clone())
    }

    /// Replay samples ordered by (timestamp, tag_id), checking staleness
    /// after each distinct timestamp.
    pub fn replay(&mut self, mut samples: Vec<Sample>) -> Vec<PendingAlert> {
        samples.sort_by(|a, b| (a.timestamp, &a.tag_id).cmp(&(b.timestamp, &b.tag_id)));

        let none = BTreeSet::new();
        let mut pending = Vec::new();
        let mut rest = samples.as_slice();
        while let Some(first) = rest.first() {
            let at = first.timestamp;
            let batch = rest.partition_point(|s| s.timestamp == at);
            for sample in &rest[..batch] {
                self.apply_sample(sample, &mut pending);
            }
            self.check_staleness(at, &none, &mut pending);
            rest = &rest[batch..];
        }
        pending
    }
}
