use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use ccp_core::config::RetryConfig;
use ccp_ingest::DataSource;

use super::retry::with_retry;
use super::{Detector, RunSummary};
use crate::error::{EngineError, Result};

/// Settings for a live polling run.
#[derive(Debug, Clone)]
pub struct LiveOptions {
    pub poll_interval: Duration,
    pub retry: RetryConfig,
    /// Stop after this many ticks. `None` runs until shutdown.
    pub max_ticks: Option<u64>,
}

impl Detector {
    /// Poll `source` every `poll_interval` until `shutdown` turns true (or
    /// its sender is dropped), then flush the event log.
    ///
    /// The event store should have been loaded from the previous run's log;
    /// it is reconciled against the wall clock before the first tick. A zero
    /// `poll_interval` is rejected before anything runs.
    pub async fn run_live(
        &mut self,
        source: &dyn DataSource,
        opts: &LiveOptions,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<RunSummary> {
        if opts.poll_interval.is_zero() {
            return Err(EngineError::PollInterval);
        }
        info!(
            source = source.name(),
            tags = self.rules.tag_ids().count(),
            rules = self.rules.rules().len(),
            poll_interval_ms = opts.poll_interval.as_millis() as u64,
            "live detection started"
        );
        let closed = self.resume(Utc::now());
        self.flush();
        self.dispatch(closed).await;

        let mut interval = tokio::time::interval(opts.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            self.tick(source, &opts.retry, Utc::now()).await;

            if opts.max_ticks.is_some_and(|max| self.summary.ticks >= max) {
                break;
            }
        }

        self.flush();
        info!(
            ticks = self.summary.ticks,
            opened = self.summary.events_opened,
            resolved = self.summary.events_resolved,
            open_now = self.machine.open_count(),
            "live detection stopped"
        );
        Ok(self.summary.clone())
    }

    /// One poll: pull the newest sample of every tag in tag_id order, run
    /// the staleness check at `now`, persist, then alert.
    pub async fn tick(&mut self, source: &dyn DataSource, retry: &RetryConfig, now: DateTime<Utc>) {
        let mut pending = Vec::new();
        let mut marked = BTreeSet::new();

        for tag_id in self.tag_ids() {
            match with_retry(retry, &tag_id, || source.latest(&tag_id)).await {
                Ok(Some(sample)) => self.apply_sample(&sample, &mut pending),
                Ok(None) => {}
                Err(e) => {
                    warn!(tag_id = %tag_id, error = %e, "data source read failed; treating tag as stale");
                    self.apply_missing(&tag_id, now, &mut pending);
                    marked.insert(tag_id);
                }
            }
        }
        self.check_staleness(now, &marked, &mut pending);
        self.summary.ticks += 1;

        self.flush();
        self.dispatch(pending).await;
    }
}
