//! RuleSet validation with structured errors and suggestions.
//!
//! Validates tag definitions, rule rows (identity, tag references, typed
//! parameters, durations) and production-status gates.
//! Returns a [`ValidationResult`] with errors (abort the run) and warnings
//! (advisory, logged at startup).

mod rule_checks;
mod tag_checks;

pub mod fuzzy;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ccp_core::duration::format_duration;

use crate::schema::RuleSetDocument;

/// Longest duration any tag or rule field may hold.
pub const MAX_DURATION: Duration = Duration::from_secs(366 * 86_400);

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// Path-like location, e.g. `"rules[2].params.limit"`.
    pub path: String,
    pub message: String,
    /// Optional "Did you mean …?" suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        });
    }

    pub(crate) fn error_with_suggestion(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
            suggestion: Some(suggestion.into()),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn check_duration(&mut self, path: impl Into<String>, d: Duration) {
        if d > MAX_DURATION {
            self.error(
                path,
                format!(
                    "{} is longer than the {} limit",
                    format_duration(d),
                    format_duration(MAX_DURATION)
                ),
            );
        }
    }

    /// One line per error, for fatal config error messages.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| match &e.suggestion {
                Some(s) => format!("{}: {} (did you mean `{}`?)", e.path, e.message, s),
                None => format!("{}: {}", e.path, e.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a parsed [`RuleSetDocument`].
pub fn validate_document(doc: &RuleSetDocument) -> ValidationResult {
    let mut result = ValidationResult::new();
    if !doc.epsilon.is_finite() || doc.epsilon < 0.0 {
        result.error("epsilon", "must be a finite, non-negative number");
    }
    tag_checks::validate_tags(doc, &mut result);
    rule_checks::validate_rules(doc, &mut result);
    result
}

/// Parse raw YAML and validate. Returns parse errors merged with validation errors.
pub fn validate_yaml(yaml: &str) -> ValidationResult {
    match serde_yaml::from_str::<RuleSetDocument>(yaml) {
        Ok(doc) => validate_document(&doc),
        Err(e) => {
            let mut result = ValidationResult::new();
            result.error("", format!("YAML parse error: {e}"));
            result
        }
    }
}
