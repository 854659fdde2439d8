use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A single reading of one tag. `value == None` is a missing reading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    pub tag_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(tag_id: impl Into<String>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            tag_id: tag_id.into(),
            timestamp,
            value: Some(value),
        }
    }

    pub fn missing(tag_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            tag_id: tag_id.into(),
            timestamp,
            value: None,
        }
    }

    /// NaN and infinities from upstream count as missing.
    pub fn finite_value(&self) -> Option<f64> {
        self.value.filter(|v| v.is_finite())
    }
}

/// Parse a UTC timestamp given as RFC 3339 or as `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(CoreError::Timestamp(format!(
        "'{s}' is not in the format \"YYYY-MM-DD HH:MM:SS\" or RFC 3339"
    )))
}
