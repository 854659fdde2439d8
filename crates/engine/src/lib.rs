//! CCP event detection engine.
//!
//! Samples flow through the rule evaluator (`ccp_rules`), the per-(tag, rule)
//! [`machine::EventStateMachine`] debouncer and into the [`store::EventStore`].
//! The [`driver::Detector`] runs that pipeline either as a live polling loop
//! or as a one-pass historical replay; both share the same per-sample code.

pub mod dashboard;
pub mod driver;
pub mod error;
pub mod machine;
pub mod reconcile;
pub mod store;

pub use dashboard::DashboardView;
pub use driver::{Detector, LiveOptions, RunSummary};
pub use error::{EngineError, Result};
pub use machine::{EventStateMachine, Reading, Transition};
pub use store::EventStore;
