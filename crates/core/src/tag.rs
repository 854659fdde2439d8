use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One sensor stream. Immutable after the RuleSet is loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub tag_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub units: String,
    /// Plant area the tag belongs to (e.g. `MF`, `RO`, `UVAOP`, `Ozone`).
    #[serde(default)]
    pub process: Option<String>,
    /// No new data for longer than this marks the tag stale.
    #[serde(with = "crate::duration::human")]
    pub staleness_timeout: Duration,
    /// Nominal update period. Each sample is taken to cover one interval
    /// when measuring how long a violation or clear run has lasted.
    #[serde(default, with = "crate::duration::human")]
    pub sample_interval: Duration,
    #[serde(default)]
    pub transform: TagTransform,
}

/// Value transform applied before any rule sees a sample.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TagTransform {
    #[default]
    None,
    /// Error and difference tags are judged on magnitude only.
    Abs,
}

impl TagTransform {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            TagTransform::None => value,
            TagTransform::Abs => value.abs(),
        }
    }
}
