pub mod config;
pub mod duration;
pub mod error;
pub mod event;
pub mod sample;
pub mod tag;

pub use config::Config;
pub use event::*;
pub use error::*;
pub use sample::Sample;
pub use tag::{Tag, TagTransform};
