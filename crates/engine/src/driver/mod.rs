//! Detection driver: the loop that owns the evaluator, the state machine and
//! the event store.
//!
//! Live and historical runs share [`Detector::apply_sample`] and the lazy
//! staleness check, so the same input produces the same events in either
//! mode. Only the clock differs: live mode observes at each poll tick,
//! historical mode at each distinct timestamp of the merged sample stream.

mod historical;
mod live;
pub mod retry;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use ccp_core::{Event, Sample, TransitionKind};
use ccp_notify::AlertDispatcher;
use ccp_rules::{Rule, RuleEvaluator, RuleSet, Signal};

use crate::machine::{EventStateMachine, Reading, Transition};
use crate::reconcile::reconcile;
use crate::store::EventStore;

pub use live::LiveOptions;

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub samples_applied: u64,
    pub samples_rejected: u64,
    pub synthetic_missing: u64,
    pub events_opened: u64,
    pub events_resolved: u64,
    pub alerts_failed: u64,
    pub ticks: u64,
}

/// A reportable transition waiting for the alert dispatcher.
#[derive(Debug, Clone)]
pub struct PendingAlert {
    pub event: Event,
    pub kind: TransitionKind,
}

pub struct Detector {
    rules: Arc<RuleSet>,
    evaluator: RuleEvaluator,
    machine: EventStateMachine,
    store: EventStore,
    dispatcher: AlertDispatcher,
    summary: RunSummary,
}

impl Detector {
    pub fn new(rules: Arc<RuleSet>, store: EventStore, dispatcher: AlertDispatcher) -> Self {
        let evaluator = RuleEvaluator::new(&rules);
        Self {
            rules,
            evaluator,
            machine: EventStateMachine::new(),
            store,
            dispatcher,
            summary: RunSummary::default(),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn machine(&self) -> &EventStateMachine {
        &self.machine
    }

    pub fn evaluator(&self) -> &RuleEvaluator {
        &self.evaluator
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn into_store(self) -> EventStore {
        self.store
    }

    /// Reconcile the loaded event log at `now` and re-seed the pipeline.
    ///
    /// Returns resolved alerts for events that had to be force-closed.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Vec<PendingAlert> {
        let outcome = reconcile(&mut self.store, &self.rules, now);
        for (tag_id, ts) in &outcome.cursors {
            self.evaluator.seed_last_accepted(tag_id, *ts);
        }
        for event in outcome.resume {
            debug!(event_id = %event.event_id, key = %event.key(), "resuming open event");
            self.machine.restore(event);
        }
        outcome
            .closed
            .into_iter()
            .map(|event| {
                self.summary.events_resolved += 1;
                PendingAlert {
                    event,
                    kind: TransitionKind::Resolved,
                }
            })
            .collect()
    }

    /// Evaluate one sample and push it through every rule on its tag.
    pub fn apply_sample(&mut self, sample: &Sample, pending: &mut Vec<PendingAlert>) {
        let rules = Arc::clone(&self.rules);
        let Some(signals) = self.evaluator.ingest(&rules, sample) else {
            self.summary.samples_rejected += 1;
            return;
        };
        self.summary.samples_applied += 1;
        for (rule, signal) in signals {
            self.record(&rules, rule, signal, sample.timestamp, Reading::Sample, pending);
        }
    }

    /// Feed a synthetic missing reading for `tag_id` at `at`.
    pub fn apply_missing(&mut self, tag_id: &str, at: DateTime<Utc>, pending: &mut Vec<PendingAlert>) {
        let rules = Arc::clone(&self.rules);
        self.summary.synthetic_missing += 1;
        for (rule, signal) in self.evaluator.missing(&rules, tag_id, at) {
            self.record(&rules, rule, signal, at, Reading::Synthetic, pending);
        }
    }

    /// Give every tag that is stale at `now` a missing reading at `now`,
    /// except those in `skip` (already marked this observation).
    pub fn check_staleness(
        &mut self,
        now: DateTime<Utc>,
        skip: &BTreeSet<String>,
        pending: &mut Vec<PendingAlert>,
    ) {
        let rules = Arc::clone(&self.rules);
        for tag_id in self.evaluator.stale_tags(&rules, now) {
            if skip.contains(&tag_id) {
                continue;
            }
            debug!(tag_id = %tag_id, now = %now, "tag is stale");
            self.apply_missing(&tag_id, now, pending);
        }
    }

    fn record(
        &mut self,
        rules: &RuleSet,
        rule: &Rule,
        signal: Signal,
        at: DateTime<Utc>,
        reading: Reading,
        pending: &mut Vec<PendingAlert>,
    ) {
        let interval = rules
            .tag(&rule.tag_id)
            .map(|t| t.sample_interval)
            .unwrap_or_default();
        let Some(transition) = self.machine.apply(rule, interval, signal, at, reading) else {
            return;
        };
        self.store.apply(&transition);

        let Some(kind) = transition.report_kind() else {
            return;
        };
        let event = transition.event();
        match &transition {
            Transition::Opened(_) => {
                self.summary.events_opened += 1;
                debug!(
                    event_id = %event.event_id,
                    key = %event.key(),
                    start_time = %event.start_time,
                    "event opened"
                );
            }
            _ => {
                self.summary.events_resolved += 1;
                debug!(
                    event_id = %event.event_id,
                    key = %event.key(),
                    end_time = ?event.end_time,
                    "event resolved"
                );
            }
        }
        pending.push(PendingAlert {
            event: event.clone(),
            kind,
        });
    }

    /// Hand pending alerts to the dispatcher, in order. Failures are logged
    /// by the dispatcher and counted here.
    pub async fn dispatch(&mut self, pending: Vec<PendingAlert>) {
        for alert in pending {
            let results = self.dispatcher.notify(&alert.event, alert.kind).await;
            self.summary.alerts_failed += results.iter().filter(|r| !r.success).count() as u64;
        }
    }

    /// Persist the store; failures leave the run going in memory.
    pub fn flush(&mut self) {
        if let Err(e) = self.store.persist() {
            debug!(error = %e, "event log not persisted");
        }
    }

    fn tag_ids(&self) -> Vec<String> {
        self.rules.tag_ids().map(str::to_string).collect()
    }
}

fn warn_missing_tags(tags: &[String]) {
    if !tags.is_empty() {
        warn!(tags = %tags.join(", "), "tags have no samples in the run window");
    }
}

#[cfg(test)]
mod tests;
