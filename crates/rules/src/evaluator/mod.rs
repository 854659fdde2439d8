//! Rule evaluation: one sample and one rule in, one [`Signal`] out.
//!
//! [`evaluate`] is the pure per-rule function. [`RuleEvaluator`] owns the
//! per-tag [`TagState`] (rolling history and dedup cursor), applies
//! production-status gates and tracks which tags have gone stale.

mod checks;
mod window;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use ccp_core::duration::to_chrono;
use ccp_core::Sample;

use crate::ruleset::{Rule, RuleCheck, RuleSet};
use crate::schema::MissingPolicy;

pub use window::{FlatRun, TagState, MAX_HISTORY_POINTS};

// ── Signal ──────────────────────────────────────────────────────────

/// Outcome of checking one sample against one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Violation,
    Clear,
    /// Neither confirms nor clears (missing data, closed gate, short window).
    Indeterminate,
}

impl Signal {
    pub(crate) fn from_violated(violated: bool) -> Self {
        if violated {
            Signal::Violation
        } else {
            Signal::Clear
        }
    }
}

impl From<MissingPolicy> for Signal {
    fn from(policy: MissingPolicy) -> Self {
        match policy {
            MissingPolicy::Indeterminate => Signal::Indeterminate,
            MissingPolicy::Violation => Signal::Violation,
            MissingPolicy::Clear => Signal::Clear,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Violation => "violation",
            Signal::Clear => "clear",
            Signal::Indeterminate => "indeterminate",
        };
        f.write_str(s)
    }
}

/// Check `sample` against `rule` using the tag's current window.
///
/// Windowed rules expect `state` to have already accepted `sample`, and a
/// stagnant rule expects `state` to track its flat run (see
/// [`TagState::track_flat`]). Gates are not considered here; see
/// [`RuleEvaluator::evaluate_rule`].
pub fn evaluate(state: &TagState, sample: &Sample, rule: &Rule) -> Signal {
    let Some(value) = state.value_of(sample) else {
        return rule.on_missing.into();
    };
    let eps = rule.epsilon;
    match &rule.check {
        RuleCheck::Threshold(p) => checks::threshold(p, value, eps),
        RuleCheck::Band(p) => checks::band(p, value, eps),
        RuleCheck::RateOfChange(p) => {
            checks::rate_of_change(p, state.history(), sample.timestamp, eps)
        }
        RuleCheck::Stagnant(p) => {
            checks::stagnant(p, state.flat_since(&rule.rule_id), sample.timestamp)
        }
    }
}

// ── Rule evaluator ──────────────────────────────────────────────────

/// Per-tag state for every tag in a RuleSet.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    tags: BTreeMap<String, TagState>,
    /// First observation time; never-seen tags go stale relative to it.
    origin: Option<DateTime<Utc>>,
}

impl RuleEvaluator {
    pub fn new(rules: &RuleSet) -> Self {
        let tags = rules
            .tags()
            .map(|tag| {
                let mut state = TagState::new(tag.transform, rules.history_span(&tag.tag_id));
                for rule in rules.rules_for_tag(&tag.tag_id) {
                    if let RuleCheck::Stagnant(_) = rule.check {
                        state.track_flat(rule.rule_id.clone(), rule.epsilon);
                    }
                }
                (tag.tag_id.clone(), state)
            })
            .collect();
        Self { tags, origin: None }
    }

    pub fn tag_state(&self, tag_id: &str) -> Option<&TagState> {
        self.tags.get(tag_id)
    }

    pub fn last_accepted(&self, tag_id: &str) -> Option<DateTime<Utc>> {
        self.tags.get(tag_id).and_then(TagState::last_accepted)
    }

    /// Reconciliation hook: samples at or before `ts` for this tag are
    /// already reflected in restored events.
    pub fn seed_last_accepted(&mut self, tag_id: &str, ts: DateTime<Utc>) {
        if let Some(state) = self.tags.get_mut(tag_id) {
            state.seed_last_accepted(ts);
        }
    }

    /// Accept a sample and evaluate every rule watching its tag.
    ///
    /// Returns `None` when the sample is rejected: unknown tag, or not newer
    /// than the tag's last accepted sample.
    pub fn ingest<'r>(
        &mut self,
        rules: &'r RuleSet,
        sample: &Sample,
    ) -> Option<Vec<(&'r Rule, Signal)>> {
        let Some(state) = self.tags.get_mut(&sample.tag_id) else {
            debug!(tag_id = %sample.tag_id, "sample for unknown tag dropped");
            return None;
        };
        if !state.accept(sample) {
            debug!(
                tag_id = %sample.tag_id,
                timestamp = %sample.timestamp,
                "duplicate or out-of-order sample dropped"
            );
            return None;
        }
        Some(self.evaluate_all(rules, sample))
    }

    /// Evaluate a synthetic missing reading for a stale tag at `at`.
    ///
    /// The tag's last accepted timestamp is left where it is.
    pub fn missing<'r>(
        &self,
        rules: &'r RuleSet,
        tag_id: &str,
        at: DateTime<Utc>,
    ) -> Vec<(&'r Rule, Signal)> {
        self.evaluate_all(rules, &Sample::missing(tag_id, at))
    }

    fn evaluate_all<'r>(&self, rules: &'r RuleSet, sample: &Sample) -> Vec<(&'r Rule, Signal)> {
        rules
            .rules_for_tag(&sample.tag_id)
            .map(|rule| (rule, self.evaluate_rule(rule, sample)))
            .collect()
    }

    /// [`evaluate`] behind the rule's production-status gates.
    pub fn evaluate_rule(&self, rule: &Rule, sample: &Sample) -> Signal {
        if !self.gates_open(rule) {
            return Signal::Indeterminate;
        }
        match self.tags.get(&rule.tag_id) {
            Some(state) => evaluate(state, sample, rule),
            None => Signal::Indeterminate,
        }
    }

    fn gates_open(&self, rule: &Rule) -> bool {
        rule.gates.iter().all(|gate| {
            match self.tags.get(&gate.tag_id).and_then(TagState::last_value) {
                Some(value) => (value - gate.equals).abs() <= rule.epsilon,
                // No status data yet: assume the plant is producing.
                None => true,
            }
        })
    }

    /// Tags whose newest accepted sample is older than their
    /// `staleness_timeout` at observation time `now`, in tag_id order.
    ///
    /// The first call fixes the origin that never-seen tags are measured
    /// from.
    pub fn stale_tags(&mut self, rules: &RuleSet, now: DateTime<Utc>) -> Vec<String> {
        let origin = *self.origin.get_or_insert(now);
        rules
            .tags()
            .filter(|tag| {
                let since = self
                    .tags
                    .get(&tag.tag_id)
                    .and_then(TagState::last_accepted)
                    .unwrap_or(origin);
                now - since > to_chrono(tag.staleness_timeout)
            })
            .map(|tag| tag.tag_id.clone())
            .collect()
    }
}
