use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use ccp_core::Sample;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

/// Pull-based access to tag samples (historian, file, memory).
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Newest sample for `tag_id`, if the source has any.
    async fn latest(&self, tag_id: &str) -> Result<Option<Sample>, DataSourceError>;

    /// Samples for `tag_id` with `start <= timestamp < end`, oldest first.
    async fn range(
        &self,
        tag_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, DataSourceError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}
