//! [`RuleSetLoader`]: YAML file or string to a validated [`RuleSet`].

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::ruleset::RuleSet;
use crate::schema::RuleSetDocument;
use crate::validation::ValidationResult;

use super::error::{Result, RuleError};

/// Loads a RuleSet once per run.
pub struct RuleSetLoader;

impl RuleSetLoader {
    /// Read, parse and validate the RuleSet at `path`.
    pub fn load_file(path: &Path) -> Result<RuleSet> {
        let contents = fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let set = Self::load_str(&contents)?;
        info!(
            path = %path.display(),
            tags = set.tags().count(),
            rules = set.rules().len(),
            "loaded rule set"
        );
        Ok(set)
    }

    /// Parse and validate a RuleSet held in memory.
    pub fn load_str(yaml: &str) -> Result<RuleSet> {
        let doc: RuleSetDocument = serde_yaml::from_str(yaml)?;
        Self::from_document(&doc)
    }

    /// Validate an already-parsed document.
    pub fn from_document(doc: &RuleSetDocument) -> Result<RuleSet> {
        match RuleSet::compile(doc) {
            Ok((set, result)) => {
                log_warnings(&result);
                Ok(set)
            }
            Err(result) => {
                log_warnings(&result);
                Err(RuleError::Validation(result))
            }
        }
    }
}

fn log_warnings(result: &ValidationResult) {
    for w in &result.warnings {
        warn!(path = %w.path, "{}", w.message);
    }
}
