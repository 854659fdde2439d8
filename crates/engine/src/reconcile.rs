//! Restart reconciliation for live runs.
//!
//! Loaded ACTIVE events are either handed back to the state machine or
//! force-closed: with annotation `incomplete` when their tag has been
//! silent for longer than its staleness timeout, with `rule-removed` when
//! their rule is no longer in the RuleSet. A force-closed event ends at its
//! last real sample. Each tag's dedup cursor is seeded from the newest
//! `last_sample` among its logged events, so samples already reflected in
//! the log are not replayed into new events.
//!
//! Synthetic missing readings only move `last_seen`, so they never count as
//! data here.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ccp_core::duration::to_chrono;
use ccp_core::{Event, EventKey, EventStatus, ANNOTATION_INCOMPLETE, ANNOTATION_RULE_REMOVED};
use ccp_rules::RuleSet;

use crate::store::EventStore;

/// Outcome of reconciling a loaded log against the current RuleSet.
#[derive(Debug, Default)]
pub struct Reconciliation {
    /// ACTIVE events to re-seed into the state machine.
    pub resume: Vec<Event>,
    /// Events force-closed during reconciliation, already in the store.
    pub closed: Vec<Event>,
    /// Newest `last_sample` per tag across the whole log.
    pub cursors: BTreeMap<String, DateTime<Utc>>,
}

/// Reconcile `store` at wall-clock time `now`.
pub fn reconcile(store: &mut EventStore, rules: &RuleSet, now: DateTime<Utc>) -> Reconciliation {
    let mut out = Reconciliation::default();

    for event in store.snapshot() {
        let Some(seen) = event.last_sample else {
            continue;
        };
        out.cursors
            .entry(event.tag_id.clone())
            .and_modify(|t| *t = (*t).max(seen))
            .or_insert(seen);
    }

    // Newest open event per key wins; the log should never hold two.
    let mut open: BTreeMap<EventKey, Event> = BTreeMap::new();
    for event in store.with_status(EventStatus::Active) {
        if let Some(older) = open.insert(event.key(), event) {
            warn!(event_id = %older.event_id, key = %older.key(), "duplicate open event in log");
            out.closed.push(close(store, older, ANNOTATION_INCOMPLETE));
        }
    }

    for (key, event) in open {
        let rule_exists = rules.rule(&key.rule_id).is_some_and(|r| r.tag_id == key.tag_id);
        if !rule_exists {
            info!(event_id = %event.event_id, key = %key, "closing event for removed rule");
            out.closed.push(close(store, event, ANNOTATION_RULE_REMOVED));
            continue;
        }

        let stale = rules
            .tag(&key.tag_id)
            .is_some_and(|tag| now - event.last_sample_or_start() > to_chrono(tag.staleness_timeout));
        if stale {
            info!(
                event_id = %event.event_id,
                key = %key,
                last_sample = %event.last_sample_or_start(),
                "closing event for stale tag"
            );
            out.closed.push(close(store, event, ANNOTATION_INCOMPLETE));
            continue;
        }

        out.resume.push(event);
    }

    info!(
        resumed = out.resume.len(),
        closed = out.closed.len(),
        "event log reconciled"
    );
    out
}

fn close(store: &mut EventStore, mut event: Event, annotation: &str) -> Event {
    let end = event.last_sample_or_start();
    event.resolve(end, Some(annotation));
    store.upsert(event.clone());
    event
}
