//! In-memory source for tests and replays built in code.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use ccp_core::Sample;

use crate::source::{DataSource, DataSourceError};

#[derive(Default)]
struct Inner {
    series: BTreeMap<String, Vec<Sample>>,
    /// Remaining injected failures per tag.
    failures: BTreeMap<String, u32>,
}

/// Samples held per tag, sorted by timestamp.
#[derive(Default)]
pub struct MemorySource {
    inner: Mutex<Inner>,
}

impl MemorySource {
    pub fn new(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut series: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
        for sample in samples {
            series.entry(sample.tag_id.clone()).or_default().push(sample);
        }
        for samples in series.values_mut() {
            samples.sort_by_key(|s| s.timestamp);
        }
        Self {
            inner: Mutex::new(Inner {
                series,
                failures: BTreeMap::new(),
            }),
        }
    }

    /// Add a sample, keeping its tag's series ordered.
    pub async fn push(&self, sample: Sample) {
        let mut inner = self.inner.lock().await;
        let series = inner.series.entry(sample.tag_id.clone()).or_default();
        let pos = series.partition_point(|s| s.timestamp <= sample.timestamp);
        series.insert(pos, sample);
    }

    /// Make the next `count` reads of `tag_id` fail.
    pub async fn fail_next(&self, tag_id: &str, count: u32) {
        self.inner.lock().await.failures.insert(tag_id.to_string(), count);
    }

    fn take_failure(inner: &mut Inner, tag_id: &str) -> Result<(), DataSourceError> {
        match inner.failures.get_mut(tag_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(DataSourceError::Unavailable(format!(
                    "injected failure reading {tag_id}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn latest(&self, tag_id: &str) -> Result<Option<Sample>, DataSourceError> {
        let mut inner = self.inner.lock().await;
        Self::take_failure(&mut inner, tag_id)?;
        Ok(inner.series.get(tag_id).and_then(|s| s.last()).cloned())
    }

    async fn range(
        &self,
        tag_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, DataSourceError> {
        let mut inner = self.inner.lock().await;
        Self::take_failure(&mut inner, tag_id)?;
        Ok(inner
            .series
            .get(tag_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|s| s.timestamp >= start && s.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
