//! Per-tag rolling state owned by the evaluator.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use ccp_core::duration::to_chrono;
use ccp_core::{Sample, TagTransform};

/// Hard cap on retained points per tag for windowed slope checks, and on
/// each extreme queue of a [`FlatRun`].
pub const MAX_HISTORY_POINTS: usize = 10_000;

/// Rolling history and dedup cursor for one tag.
#[derive(Debug, Clone)]
pub struct TagState {
    transform: TagTransform,
    retention: Duration,
    history: VecDeque<(DateTime<Utc>, f64)>,
    /// Flat-run trackers for the stagnant rules on this tag, by rule_id.
    flat: BTreeMap<String, FlatRun>,
    last_accepted: Option<DateTime<Utc>>,
    last_value: Option<f64>,
}

impl TagState {
    /// `retention` is the longest window any rule on this tag looks back over.
    pub fn new(transform: TagTransform, retention: Duration) -> Self {
        Self {
            transform,
            retention,
            history: VecDeque::new(),
            flat: BTreeMap::new(),
            last_accepted: None,
            last_value: None,
        }
    }

    /// Take `sample` into the window.
    ///
    /// Returns `false` (and changes nothing) when its timestamp is not newer
    /// than the last accepted one.
    pub fn accept(&mut self, sample: &Sample) -> bool {
        if self.last_accepted.is_some_and(|last| sample.timestamp <= last) {
            return false;
        }
        self.last_accepted = Some(sample.timestamp);

        if let Some(value) = self.value_of(sample) {
            self.last_value = Some(value);
            self.history.push_back((sample.timestamp, value));
            self.trim(sample.timestamp);
            for run in self.flat.values_mut() {
                run.push(sample.timestamp, value);
            }
        }
        true
    }

    /// Follow how long the value has stayed flat within `epsilon` for the
    /// stagnant rule `rule_id`.
    pub fn track_flat(&mut self, rule_id: impl Into<String>, epsilon: f64) {
        self.flat.insert(rule_id.into(), FlatRun::new(epsilon));
    }

    /// Timestamp of the first sample of the current flat run for `rule_id`.
    pub fn flat_since(&self, rule_id: &str) -> Option<DateTime<Utc>> {
        self.flat.get(rule_id).and_then(FlatRun::since)
    }

    /// Transformed value of `sample`, `None` when missing or non-finite.
    pub fn value_of(&self, sample: &Sample) -> Option<f64> {
        sample.finite_value().map(|v| self.transform.apply(v))
    }

    /// Move the dedup cursor forward without adding history.
    pub fn seed_last_accepted(&mut self, ts: DateTime<Utc>) {
        if self.last_accepted.map_or(true, |last| ts > last) {
            self.last_accepted = Some(ts);
        }
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }

    /// Most recent finite value, used for gating.
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Retained points, oldest first.
    pub fn history(&self) -> &VecDeque<(DateTime<Utc>, f64)> {
        &self.history
    }

    // Keep one point at or before the cutoff so a window can be proven to
    // cover its full span.
    fn trim(&mut self, latest: DateTime<Utc>) {
        if let Some(cutoff) = latest.checked_sub_signed(to_chrono(self.retention)) {
            while self.history.len() > 1 && self.history[1].0 <= cutoff {
                self.history.pop_front();
            }
        }
        while self.history.len() > MAX_HISTORY_POINTS {
            self.history.pop_front();
        }
    }
}

/// Longest run of trailing samples whose values stay within `epsilon` of
/// each other.
///
/// Two monotonic queues hold the candidate minimum and maximum of the run.
/// Each entry also remembers the first sample it stands for, so the run
/// start is exact without keeping every point. A constant signal costs one
/// entry per queue however long it lasts.
#[derive(Debug, Clone)]
pub struct FlatRun {
    epsilon: f64,
    since: Option<DateTime<Utc>>,
    lows: VecDeque<Extreme>,
    highs: VecDeque<Extreme>,
}

#[derive(Debug, Clone, Copy)]
struct Extreme {
    at: DateTime<Utc>,
    value: f64,
    /// First sample this entry dominates.
    from: DateTime<Utc>,
}

impl FlatRun {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            since: None,
            lows: VecDeque::new(),
            highs: VecDeque::new(),
        }
    }

    /// Start of the current run, `None` before the first value.
    pub fn since(&self) -> Option<DateTime<Utc>> {
        self.since
    }

    /// Add a value newer than every value seen so far.
    pub fn push(&mut self, at: DateTime<Utc>, value: f64) {
        push_extreme(&mut self.lows, at, value, |kept, new| kept >= new);
        push_extreme(&mut self.highs, at, value, |kept, new| kept <= new);
        self.since.get_or_insert(at);

        loop {
            let (Some(lo), Some(hi)) = (self.lows.front().copied(), self.highs.front().copied())
            else {
                break;
            };
            if hi.value - lo.value <= self.epsilon {
                break;
            }
            // The older extreme cannot be part of a flat run ending now.
            self.cut(lo.at.min(hi.at));
        }

        // Only a slow drift inside epsilon grows a queue this far. Dropping
        // the oldest extreme shortens the run, which can only delay a
        // violation.
        while self.lows.len() > MAX_HISTORY_POINTS || self.highs.len() > MAX_HISTORY_POINTS {
            let oldest = match (self.lows.front(), self.highs.front()) {
                (Some(lo), Some(hi)) => lo.at.min(hi.at),
                _ => break,
            };
            self.cut(oldest);
        }
    }

    // Drop every entry at or before `at`; the run restarts at the first
    // sample after it.
    fn cut(&mut self, at: DateTime<Utc>) {
        let mut next = None;
        for queue in [&mut self.lows, &mut self.highs] {
            while queue.front().is_some_and(|e| e.at <= at) {
                queue.pop_front();
                if let Some(front) = queue.front() {
                    if front.from > at {
                        next = Some(next.map_or(front.from, |n: DateTime<Utc>| n.min(front.from)));
                    }
                }
            }
        }
        if let Some(next) = next {
            self.since = Some(self.since.map_or(next, |s| s.max(next)));
        }
    }
}

fn push_extreme(
    queue: &mut VecDeque<Extreme>,
    at: DateTime<Utc>,
    value: f64,
    dominated: impl Fn(f64, f64) -> bool,
) {
    let mut from = at;
    while let Some(back) = queue.back() {
        if !dominated(back.value, value) {
            break;
        }
        from = back.from;
        queue.pop_back();
    }
    queue.push_back(Extreme { at, value, from });
}
