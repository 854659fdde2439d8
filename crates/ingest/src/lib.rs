//! Sample sources for the detection driver.
//!
//! The engine only ever pulls through [`DataSource`]; connection handling
//! and file formats live here.

pub mod jsonl;
pub mod memory;
pub mod source;

pub use jsonl::JsonlSource;
pub use memory::MemorySource;
pub use source::{DataSource, DataSourceError};
