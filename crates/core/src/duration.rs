//! Human-readable durations (`"15m"`, `"1h30m"`, `"90s"`) for rule and tag
//! configuration, plus the serde adapter used by the RuleSet schema.

use std::time::Duration;

use crate::error::{CoreError, Result};

/// Parse a human-readable duration string into a [`Duration`].
///
/// Supports components: `Xd` (days), `Xh` (hours), `Xm` (minutes), `Xs` (seconds).
/// Components can be combined: "2h30m", "1d12h", "90s". A bare number is
/// read as seconds, and `"0"` / `"0s"` are valid zero durations.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CoreError::Duration("empty duration".to_string()));
    }

    let invalid = || CoreError::Duration(format!("'{s}' is not a duration like 90s, 15m or 1h30m"));

    let mut total_secs: u64 = 0;
    let mut num_buf = String::new();
    let mut found_unit = false;

    for ch in s.chars() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
        } else {
            let n: u64 = num_buf.parse().map_err(|_| invalid())?;
            num_buf.clear();
            let scale = match ch {
                'd' => 86_400,
                'h' => 3_600,
                'm' => 60,
                's' => 1,
                _ => return Err(invalid()),
            };
            total_secs = n
                .checked_mul(scale)
                .and_then(|v| total_secs.checked_add(v))
                .ok_or_else(invalid)?;
            found_unit = true;
        }
    }

    if !num_buf.is_empty() {
        // "30m15" is ambiguous.
        if found_unit {
            return Err(invalid());
        }
        let n: u64 = num_buf.parse().map_err(|_| invalid())?;
        total_secs += n;
    }

    Ok(Duration::from_secs(total_secs))
}

/// Render a duration in the same notation [`parse_duration`] accepts.
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    if secs == 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, scale) in [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)] {
        let n = secs / scale;
        if n > 0 {
            out.push_str(&n.to_string());
            out.push(unit);
            secs -= n * scale;
        }
    }
    out
}

/// Convert to a signed chrono duration for timestamp arithmetic.
pub fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(d.as_millis().min(i64::MAX as u128) as i64)
}

/// Serde adapter: `#[serde(with = "ccp_core::duration::human")]`.
pub mod human {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Secs(n) => Ok(Duration::from_secs(n)),
            Raw::Text(t) => super::parse_duration(&t).map_err(serde::de::Error::custom),
        }
    }
}
