//! Alert delivery for event transitions.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable alert channels
//! - Tracing and in-memory report notifiers
//! - Minijinja template rendering for alert subjects and bodies
//! - `AlertDispatcher`, which renders once per transition and fans out to
//!   every channel

pub mod dispatcher;
pub mod report;
pub mod templating;
pub mod tracing_sink;
pub mod traits;

pub use dispatcher::{AlertDispatcher, AlertTemplates};
pub use report::ReportNotifier;
pub use tracing_sink::TracingNotifier;
pub use traits::{Alert, DispatchResult, Notifier, NotifyError};
