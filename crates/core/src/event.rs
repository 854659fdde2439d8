//! Event records: the unit of output of the detection engine and the unit of
//! the persisted event log.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Annotation for events closed because their source went stale.
pub const ANNOTATION_INCOMPLETE: &str = "incomplete";
/// Annotation for open events whose rule is gone from the RuleSet.
pub const ANNOTATION_RULE_REMOVED: &str = "rule-removed";

/// Lifecycle status of an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Violating, but not yet for `min_duration`. Never reported.
    Candidate,
    /// Confirmed and reported; still open.
    Active,
    /// Closed. Immutable from here on.
    Resolved,
}

impl EventStatus {
    pub fn is_open(self) -> bool {
        matches!(self, EventStatus::Candidate | EventStatus::Active)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventStatus::Candidate => "CANDIDATE",
            EventStatus::Active => "ACTIVE",
            EventStatus::Resolved => "RESOLVED",
        };
        f.write_str(s)
    }
}

/// Operator-facing severity of a rule and the events it produces.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Reportable transitions. Candidate creation and discard are never reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// CANDIDATE → ACTIVE.
    Opened,
    /// ACTIVE → RESOLVED.
    Resolved,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Opened => f.write_str("opened"),
            TransitionKind::Resolved => f.write_str("resolved"),
        }
    }
}

/// Identity of a debouncer: one open event at most per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub tag_id: String,
    pub rule_id: String,
}

impl EventKey {
    pub fn new(tag_id: impl Into<String>, rule_id: impl Into<String>) -> Self {
        Self {
            tag_id: tag_id.into(),
            rule_id: rule_id.into(),
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tag_id, self.rule_id)
    }
}

/// A detected event. Field order is the persisted field order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub tag_id: String,
    pub rule_id: String,
    #[serde(default)]
    pub event_name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: EventStatus,
    #[serde(default)]
    pub severity: Severity,
    /// Timestamp of the newest observation applied to this event, including
    /// missing readings synthesized for a stale tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Timestamp of the newest sample read from the data source. Synthetic
    /// readings never move it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sample: Option<DateTime<Utc>>,
    /// First clearing sample of a resolution run that has not completed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearing_since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl Event {
    /// A fresh CANDIDATE starting at `start_time`.
    pub fn candidate(
        tag_id: &str,
        rule_id: &str,
        event_name: &str,
        severity: Severity,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: derive_event_id(tag_id, rule_id, start_time),
            tag_id: tag_id.to_string(),
            rule_id: rule_id.to_string(),
            event_name: event_name.to_string(),
            start_time,
            end_time: None,
            status: EventStatus::Candidate,
            severity,
            last_seen: Some(start_time),
            last_sample: None,
            clearing_since: None,
            annotation: None,
        }
    }

    pub fn key(&self) -> EventKey {
        EventKey::new(&self.tag_id, &self.rule_id)
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Newest sample applied, falling back to `start_time` for logs that
    /// predate the field.
    pub fn last_seen_or_start(&self) -> DateTime<Utc> {
        self.last_seen.unwrap_or(self.start_time)
    }

    /// Newest real sample applied, falling back to `start_time` for events
    /// that only ever saw synthetic readings.
    pub fn last_sample_or_start(&self) -> DateTime<Utc> {
        self.last_sample.unwrap_or(self.start_time)
    }

    /// Close the event. `end_time` is clamped so it never precedes `start_time`.
    pub fn resolve(&mut self, end_time: DateTime<Utc>, annotation: Option<&str>) {
        self.end_time = Some(end_time.max(self.start_time));
        self.status = EventStatus::Resolved;
        self.clearing_since = None;
        if let Some(a) = annotation {
            self.annotation = Some(a.to_string());
        }
    }
}

/// Stable event identifier: the same (tag, rule, start) always yields the
/// same id, across runs and across live and historical mode.
pub fn derive_event_id(tag_id: &str, rule_id: &str, start_time: DateTime<Utc>) -> String {
    let material = format!(
        "{tag_id}\0{rule_id}\0{}",
        start_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    let digest = Sha256::digest(material.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}
