//! Error types for RuleSet loading.

use crate::validation::ValidationResult;

/// Errors that abort a run before detection starts.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but failed validation.
    #[error("invalid rule set: {}", .0.error_summary())]
    Validation(ValidationResult),
}

/// Result alias for rule loading.
pub type Result<T> = std::result::Result<T, RuleError>;
