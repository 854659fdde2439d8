//! JSON Lines sample file, one reading per line:
//!
//! ```text
//! {"tag_id": "MF-FILT-TURB", "timestamp": "2023-05-24T12:00:00Z", "value": 0.04}
//! {"tag_id": "MF-FILT-TURB", "timestamp": "2023-05-24 12:01:00", "value": null}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Malformed lines are
//! logged and skipped. The file is re-read whenever its modification time
//! changes, so a live run sees lines appended by an exporter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use ccp_core::sample::parse_timestamp;
use ccp_core::Sample;

use crate::source::{DataSource, DataSourceError};

#[derive(Deserialize)]
struct SampleRecord {
    tag_id: String,
    timestamp: String,
    #[serde(default)]
    value: Option<f64>,
}

#[derive(Default)]
struct Cache {
    modified: Option<SystemTime>,
    series: BTreeMap<String, Vec<Sample>>,
}

/// File-backed [`DataSource`].
pub struct JsonlSource {
    path: PathBuf,
    name: String,
    cache: Mutex<Cache>,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("jsonl:{}", path.display());
        Self {
            path,
            name,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> DataSourceError {
        DataSourceError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    async fn refresh(&self, cache: &mut Cache) -> Result<(), DataSourceError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let modified = meta.modified().ok();
        if modified.is_some() && cache.modified == modified {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        cache.series = parse_lines(&contents, &self.path);
        cache.modified = modified;
        debug!(
            path = %self.path.display(),
            tags = cache.series.len(),
            "sample file loaded"
        );
        Ok(())
    }
}

/// Parse a whole file into per-tag series sorted by timestamp.
pub fn parse_lines(contents: &str, path: &Path) -> BTreeMap<String, Vec<Sample>> {
    let mut series: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for (i, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(sample) => series.entry(sample.tag_id.clone()).or_default().push(sample),
            Err(e) => warn!(
                path = %path.display(),
                line = i + 1,
                error = %e,
                "skipping malformed sample line"
            ),
        }
    }
    for samples in series.values_mut() {
        samples.sort_by_key(|s| s.timestamp);
    }
    series
}

fn parse_line(line: &str) -> Result<Sample, String> {
    let record: SampleRecord = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let timestamp = parse_timestamp(&record.timestamp).map_err(|e| e.to_string())?;
    Ok(Sample {
        tag_id: record.tag_id,
        timestamp,
        value: record.value,
    })
}

#[async_trait]
impl DataSource for JsonlSource {
    async fn latest(&self, tag_id: &str) -> Result<Option<Sample>, DataSourceError> {
        let mut cache = self.cache.lock().await;
        self.refresh(&mut cache).await?;
        Ok(cache.series.get(tag_id).and_then(|s| s.last()).cloned())
    }

    async fn range(
        &self,
        tag_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Sample>, DataSourceError> {
        let mut cache = self.cache.lock().await;
        self.refresh(&mut cache).await?;
        let Some(series) = cache.series.get(tag_id) else {
            return Ok(Vec::new());
        };
        let from = series.partition_point(|s| s.timestamp < start);
        let to = series.partition_point(|s| s.timestamp < end);
        Ok(series[from..to.max(from)].to_vec())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
