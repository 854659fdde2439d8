//! RuleSet document types as they appear in YAML.
//!
//! Detection parameters are kept as raw YAML (`params`) and parsed into the
//! typed structs below once the `rule_type` is known, so that a bad
//! parameter block produces a validation error pointing at that rule instead
//! of a single opaque parse failure for the whole file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ccp_core::{Severity, Tag};

/// Default comparison tolerance when the document does not set one.
pub const DEFAULT_EPSILON: f64 = 1e-9;

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_true() -> bool {
    true
}

/// Top-level RuleSet document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleSetDocument {
    /// Tolerance used for boundary comparisons unless a rule overrides it.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// One rule row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDef {
    pub rule_id: String,
    pub tag_id: String,
    pub event_name: String,
    pub rule_type: RuleType,
    #[serde(default)]
    pub params: Option<serde_yaml::Value>,
    #[serde(with = "ccp_core::duration::human")]
    pub min_duration: Duration,
    #[serde(default, with = "ccp_core::duration::human")]
    pub clear_duration: Duration,
    #[serde(default)]
    pub severity: Severity,
    /// Dashboard row (plant area). Defaults to the tag's process.
    #[serde(default)]
    pub process: Option<String>,
    /// Dashboard column (e.g. `Process`, `Monitoring`, `Water Quality 1`).
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub epsilon: Option<f64>,
    #[serde(default)]
    pub on_missing: Option<MissingPolicy>,
    #[serde(default)]
    pub gates: Vec<Gate>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Built-in rule types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Threshold,
    Band,
    RateOfChange,
    Stagnant,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Threshold => "threshold",
            RuleType::Band => "band",
            RuleType::RateOfChange => "rate_of_change",
            RuleType::Stagnant => "stagnant",
        }
    }
}

/// What a missing reading means for a rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Neither confirms nor clears.
    Indeterminate,
    /// Counted as violating (frozen or absent instrument).
    Violation,
    Clear,
}

/// Production-status gate: the rule only runs while `tag_id` reads `equals`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gate {
    pub tag_id: String,
    #[serde(default = "default_gate_value")]
    pub equals: f64,
}

fn default_gate_value() -> f64 {
    1.0
}

// ── Rule parameters ──────────────────────────────────────────────────

/// Parameters for the `threshold` rule type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ThresholdParams {
    pub operator: ThresholdOperator,
    pub limit: f64,
}

/// Which side of the limit is a violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdOperator {
    Above,
    Below,
}

/// Parameters for the `band` rule type. Values outside `[low, high]` violate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BandParams {
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
}

/// Parameters for the `rate_of_change` rule type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RateOfChangeParams {
    #[serde(with = "ccp_core::duration::human")]
    pub window: Duration,
    /// Largest tolerated slope, in tag units per `per`.
    pub max_rate: f64,
    #[serde(default = "default_rate_period", with = "ccp_core::duration::human")]
    pub per: Duration,
    #[serde(default)]
    pub direction: Direction,
}

fn default_rate_period() -> Duration {
    Duration::from_secs(60)
}

/// Slope direction a rate rule watches.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Rising,
    Falling,
    #[default]
    Either,
}

/// Parameters for the `stagnant` rule type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StagnantParams {
    /// How long the value must stay flat to count as frozen.
    #[serde(with = "ccp_core::duration::human")]
    pub span: Duration,
}

impl RuleDef {
    /// Parse `params` into the parameter struct for `T`.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_yaml::Error>> {
        self.params
            .as_ref()
            .map(|v| serde_yaml::from_value(v.clone()))
    }
}
