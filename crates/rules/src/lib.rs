//! CCP rule definitions and the per-sample rule evaluator.
//!
//! This crate provides:
//! - YAML RuleSet schema (tags + rules) with serde deserialization
//! - Validation with structured errors, warnings and "did you mean" hints
//! - A one-shot loader that turns a YAML file into a validated [`RuleSet`]
//! - The rule evaluator (threshold, band, rate of change, stagnant) with
//!   per-tag rolling windows and production-status gating

pub mod evaluator;
pub mod loader;
pub mod ruleset;
pub mod schema;
pub mod validation;

pub use evaluator::{RuleEvaluator, Signal, TagState};
pub use loader::{RuleError, RuleSetLoader};
pub use ruleset::{Rule, RuleCheck, RuleSet};
