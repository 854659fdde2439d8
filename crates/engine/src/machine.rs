//! Per-(tag, rule) debouncer: CLEAR → CANDIDATE → ACTIVE → RESOLVED.
//!
//! A run of violations opens a CANDIDATE back-dated to its first violating
//! sample. The candidate becomes ACTIVE once the run spans `min_duration`,
//! and is discarded without trace if a clearing sample arrives first. An
//! ACTIVE event resolves once a clearing run spans `clear_duration`; its
//! `end_time` is the first sample of that clearing run.
//!
//! Spans count each sample as covering one `sample_interval` of its tag:
//! `span(first, latest) = latest - first + sample_interval`.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use ccp_core::duration::to_chrono;
use ccp_core::{Event, EventKey, EventStatus, TransitionKind};
use ccp_rules::{Rule, Signal};

/// What applying one signal did to the event for its (tag, rule).
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// CLEAR → CANDIDATE.
    Candidate(Event),
    /// CANDIDATE dropped before confirmation. Never persisted.
    Discarded(Event),
    /// CANDIDATE → ACTIVE.
    Opened(Event),
    /// Open event touched without a status change.
    Updated(Event),
    /// ACTIVE → RESOLVED.
    Resolved(Event),
}

impl Transition {
    pub fn event(&self) -> &Event {
        match self {
            Transition::Candidate(e)
            | Transition::Discarded(e)
            | Transition::Opened(e)
            | Transition::Updated(e)
            | Transition::Resolved(e) => e,
        }
    }

    /// The alert this transition warrants, if any.
    pub fn report_kind(&self) -> Option<TransitionKind> {
        match self {
            Transition::Opened(_) => Some(TransitionKind::Opened),
            Transition::Resolved(_) => Some(TransitionKind::Resolved),
            _ => None,
        }
    }
}

/// Where the observation behind a signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// A sample read from the data source.
    Sample,
    /// A missing reading synthesized for a stale or unreadable tag.
    Synthetic,
}

/// Open (CANDIDATE or ACTIVE) events, at most one per [`EventKey`].
#[derive(Debug, Default)]
pub struct EventStateMachine {
    open: BTreeMap<EventKey, Event>,
}

impl EventStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-seed an ACTIVE event restored from the event log.
    ///
    /// Anything other than an open event is ignored.
    pub fn restore(&mut self, event: Event) {
        if event.status == EventStatus::Active {
            self.open.insert(event.key(), event);
        }
    }

    pub fn open_event(&self, key: &EventKey) -> Option<&Event> {
        self.open.get(key)
    }

    pub fn open_events(&self) -> impl Iterator<Item = &Event> {
        self.open.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Apply the signal `rule` produced for an observation at `at`.
    ///
    /// `sample_interval` is the nominal update period of the rule's tag.
    /// Only [`Reading::Sample`] observations move an event's `last_sample`.
    pub fn apply(
        &mut self,
        rule: &Rule,
        sample_interval: Duration,
        signal: Signal,
        at: DateTime<Utc>,
        reading: Reading,
    ) -> Option<Transition> {
        let key = EventKey::new(&rule.tag_id, &rule.rule_id);
        let span = |from: DateTime<Utc>| at - from + to_chrono(sample_interval);

        let Some(event) = self.open.get_mut(&key) else {
            if signal != Signal::Violation {
                return None;
            }
            let mut event = Event::candidate(
                &rule.tag_id,
                &rule.rule_id,
                &rule.event_name,
                rule.severity,
                at,
            );
            if reading == Reading::Sample {
                event.last_sample = Some(at);
            }
            let confirmed = span(at) >= to_chrono(rule.min_duration);
            if confirmed {
                event.status = EventStatus::Active;
            }
            debug!(key = %key, event_id = %event.event_id, confirmed, "violation run started");
            self.open.insert(key, event.clone());
            return Some(if confirmed {
                Transition::Opened(event)
            } else {
                Transition::Candidate(event)
            });
        };

        if at <= event.last_seen_or_start() {
            return None;
        }
        event.last_seen = Some(at);
        if reading == Reading::Sample {
            event.last_sample = Some(at);
        }

        match (event.status, signal) {
            (_, Signal::Indeterminate) => Some(Transition::Updated(event.clone())),

            (EventStatus::Candidate, Signal::Violation) => {
                if span(event.start_time) >= to_chrono(rule.min_duration) {
                    event.status = EventStatus::Active;
                    Some(Transition::Opened(event.clone()))
                } else {
                    Some(Transition::Updated(event.clone()))
                }
            }
            (EventStatus::Candidate, Signal::Clear) => {
                let event = self.open.remove(&key)?;
                debug!(key = %key, event_id = %event.event_id, "candidate discarded");
                Some(Transition::Discarded(event))
            }

            (_, Signal::Violation) => {
                event.clearing_since = None;
                Some(Transition::Updated(event.clone()))
            }
            (_, Signal::Clear) => {
                let since = *event.clearing_since.get_or_insert(at);
                if span(since) >= to_chrono(rule.clear_duration) {
                    let mut event = self.open.remove(&key)?;
                    event.resolve(since, None);
                    Some(Transition::Resolved(event))
                } else {
                    Some(Transition::Updated(event.clone()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccp_rules::RuleSetLoader;
    use chrono::TimeZone;

    const RULES: &str = r#"
tags:
  - tag_id: MF-TURB
    staleness_timeout: 10m
rules:
  - rule_id: mf-turbidity
    tag_id: MF-TURB
    event_name: MF Process
    rule_type: threshold
    params: { operator: above, limit: 0.3 }
    min_duration: 5m
    clear_duration: 2m
  - rule_id: mf-instant
    tag_id: MF-TURB
    event_name: MF Instant
    rule_type: threshold
    params: { operator: above, limit: 0.3 }
    min_duration: 0s
"#;

    const MINUTE: Duration = Duration::from_secs(60);

    fn rule(id: &str) -> Rule {
        let set = RuleSetLoader::load_str(RULES).unwrap();
        set.rule(id).unwrap().clone()
    }

    fn at(min: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 5, 24, 0, 0, 0).unwrap() + chrono::Duration::minutes(min)
    }

    fn run(machine: &mut EventStateMachine, rule: &Rule, signals: &[(i64, Signal)]) -> Vec<Transition> {
        signals
            .iter()
            .filter_map(|(m, s)| machine.apply(rule, MINUTE, *s, at(*m), Reading::Sample))
            .collect()
    }

    use Signal::{Clear, Indeterminate, Violation};

    #[test]
    fn short_run_is_discarded() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        let out = run(
            &mut machine,
            &rule,
            &[(0, Clear), (1, Violation), (2, Violation), (3, Violation), (4, Violation), (5, Clear)],
        );
        assert!(matches!(out[0], Transition::Candidate(_)));
        assert!(matches!(out.last(), Some(Transition::Discarded(_))));
        assert!(out.iter().all(|t| t.report_kind().is_none()));
        assert_eq!(machine.open_count(), 0);
    }

    #[test]
    fn confirms_then_resolves_back_dated() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        let signals: Vec<(i64, Signal)> = (1..=6)
            .map(|m| (m, Violation))
            .chain([(7, Clear), (8, Clear)])
            .collect();
        let out = run(&mut machine, &rule, &signals);

        let opened: Vec<_> = out.iter().filter(|t| matches!(t, Transition::Opened(_))).collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].event().start_time, at(1));
        assert_eq!(opened[0].event().last_seen, Some(at(5)));

        let Some(Transition::Resolved(event)) = out.last() else {
            panic!("expected resolution, got {:?}", out.last());
        };
        assert_eq!(event.start_time, at(1));
        assert_eq!(event.end_time, Some(at(7)));
        assert_eq!(event.status, EventStatus::Resolved);
        assert_eq!(machine.open_count(), 0);
    }

    #[test]
    fn violation_cancels_clearing_timer() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        let mut signals: Vec<(i64, Signal)> = (0..5).map(|m| (m, Violation)).collect();
        signals.extend([(5, Clear), (6, Violation), (7, Clear), (8, Indeterminate), (9, Clear)]);
        let out = run(&mut machine, &rule, &signals);

        let Some(Transition::Resolved(event)) = out.last() else {
            panic!("expected resolution");
        };
        assert_eq!(event.end_time, Some(at(7)));
    }

    #[test]
    fn indeterminate_neither_confirms_nor_clears() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        run(&mut machine, &rule, &[(0, Violation), (1, Indeterminate), (2, Indeterminate)]);
        let key = EventKey::new("MF-TURB", "mf-turbidity");
        let event = machine.open_event(&key).unwrap();
        assert_eq!(event.status, EventStatus::Candidate);
        assert_eq!(event.last_seen, Some(at(2)));

        // The run still counts from its first violation.
        let out = run(&mut machine, &rule, &[(4, Violation)]);
        assert!(matches!(out[0], Transition::Opened(_)));
    }

    #[test]
    fn synthetic_readings_leave_last_sample() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        run(&mut machine, &rule, &[(0, Violation), (6, Violation)]);
        for m in [20, 30, 40] {
            machine.apply(&rule, MINUTE, Indeterminate, at(m), Reading::Synthetic);
        }
        let event = machine.open_event(&EventKey::new("MF-TURB", "mf-turbidity")).unwrap();
        assert_eq!(event.status, EventStatus::Active);
        assert_eq!(event.last_seen, Some(at(40)));
        assert_eq!(event.last_sample, Some(at(6)));

        // A run started by a synthetic violation has no real sample yet.
        let mut machine = EventStateMachine::new();
        let Some(Transition::Candidate(event)) =
            machine.apply(&rule, MINUTE, Violation, at(50), Reading::Synthetic)
        else {
            panic!("expected a candidate");
        };
        assert_eq!(event.last_sample, None);
        assert_eq!(event.last_sample_or_start(), at(50));
    }

    #[test]
    fn zero_min_duration_opens_on_first_violation() {
        let rule = rule("mf-instant");
        let mut machine = EventStateMachine::new();
        let out = run(&mut machine, &rule, &[(0, Violation), (1, Clear)]);
        assert!(matches!(out[0], Transition::Opened(_)));
        // clear_duration 0 resolves on the first clear.
        let Transition::Resolved(event) = &out[1] else {
            panic!("expected resolution");
        };
        assert_eq!(event.end_time, Some(at(1)));
    }

    #[test]
    fn stale_and_duplicate_signals_are_ignored() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        run(&mut machine, &rule, &[(3, Violation)]);
        assert!(machine.apply(&rule, MINUTE, Clear, at(3), Reading::Sample).is_none());
        assert!(machine.apply(&rule, MINUTE, Clear, at(2), Reading::Sample).is_none());
        assert_eq!(machine.open_count(), 1);
    }

    #[test]
    fn resolved_is_terminal_and_next_run_is_new() {
        let rule = rule("mf-instant");
        let mut machine = EventStateMachine::new();
        let out = run(&mut machine, &rule, &[(0, Violation), (1, Clear), (2, Violation)]);
        assert_eq!(out.len(), 3);
        assert_ne!(out[0].event().event_id, out[2].event().event_id);
        assert_eq!(out[2].event().start_time, at(2));
    }

    #[test]
    fn restored_event_keeps_clearing_timer() {
        let rule = rule("mf-turbidity");
        let mut machine = EventStateMachine::new();
        let mut event = Event::candidate("MF-TURB", "mf-turbidity", "MF Process", rule.severity, at(0));
        event.status = EventStatus::Active;
        event.last_seen = Some(at(10));
        event.clearing_since = Some(at(10));
        machine.restore(event.clone());

        let out = run(&mut machine, &rule, &[(11, Clear)]);
        let Transition::Resolved(resolved) = &out[0] else {
            panic!("expected resolution");
        };
        assert_eq!(resolved.event_id, event.event_id);
        assert_eq!(resolved.end_time, Some(at(10)));
    }
}
