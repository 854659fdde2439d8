//! RuleSet loader: read a YAML document from disk, validate it, and hand
//! back an immutable [`RuleSet`](crate::RuleSet).
//!
//! Validation warnings are logged; any validation error is fatal and is
//! returned as [`RuleError::Validation`].

mod core;
mod error;


pub use self::core::RuleSetLoader;
pub use self::error::{Result, RuleError};
