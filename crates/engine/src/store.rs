//! The event table and its JSON event log.
//!
//! The whole table is written on every persist: serialized to
//! `<path>.tmp`, then renamed over `<path>`, so readers never see a torn
//! file. Events are ordered by (start_time, tag_id, rule_id), which makes
//! the log of a historical replay byte-for-byte reproducible.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use ccp_core::{Event, EventStatus};

use crate::error::{EngineError, Result};
use crate::machine::Transition;

/// Every known event, keyed by `event_id`.
#[derive(Debug, Default)]
pub struct EventStore {
    path: Option<PathBuf>,
    events: BTreeMap<String, Event>,
    degraded: bool,
}

impl EventStore {
    /// Store that persists to `path`. Starts empty; see [`EventStore::load`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Restore the event log at `path`.
    ///
    /// A missing file is an empty log. CANDIDATE events are dropped: they
    /// were never reported and their runs are re-detected from data.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = Self::new(path.clone());
        if !path.exists() {
            info!(path = %path.display(), "no event log yet; starting empty");
            return Ok(store);
        }

        let contents = fs::read_to_string(&path).map_err(|source| EngineError::Read {
            path: path.clone(),
            source,
        })?;
        let events: Vec<Event> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&contents).map_err(|source| EngineError::Corrupt {
                path: path.clone(),
                source,
            })?
        };

        let mut dropped = 0usize;
        for event in events {
            if event.status == EventStatus::Candidate {
                dropped += 1;
                continue;
            }
            store.events.insert(event.event_id.clone(), event);
        }
        info!(
            path = %path.display(),
            events = store.events.len(),
            dropped_candidates = dropped,
            "event log loaded"
        );
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a state machine transition.
    pub fn apply(&mut self, transition: &Transition) {
        match transition {
            Transition::Discarded(event) => {
                self.events.remove(&event.event_id);
            }
            Transition::Candidate(event)
            | Transition::Opened(event)
            | Transition::Updated(event)
            | Transition::Resolved(event) => {
                self.events.insert(event.event_id.clone(), event.clone());
            }
        }
    }

    /// Insert or replace an event outside the state machine (reconciliation).
    pub fn upsert(&mut self, event: Event) {
        self.events.insert(event.event_id.clone(), event);
    }

    pub fn get(&self, event_id: &str) -> Option<&Event> {
        self.events.get(event_id)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in log order: (start_time, tag_id, rule_id), then event_id.
    pub fn snapshot(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort_by(|a, b| {
            (a.start_time, &a.tag_id, &a.rule_id, &a.event_id)
                .cmp(&(b.start_time, &b.tag_id, &b.rule_id, &b.event_id))
        });
        events
    }

    /// Events with the given status, in log order.
    pub fn with_status(&self, status: EventStatus) -> Vec<Event> {
        self.snapshot()
            .into_iter()
            .filter(|e| e.status == status)
            .collect()
    }

    /// The log as pretty JSON, newline-terminated.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.snapshot())?;
        json.push('\n');
        Ok(json)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Write the log, retrying once.
    ///
    /// On repeated failure the store keeps running in memory: the first
    /// failure of a degraded period is logged as a warning, recovery at info.
    pub fn persist(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let json = self.to_json()?;

        let result = write_atomic(&path, &json).or_else(|e| {
            debug!(path = %path.display(), error = %e, "event log write failed; retrying");
            write_atomic(&path, &json)
        });

        match result {
            Ok(()) => {
                if self.degraded {
                    info!(path = %path.display(), "event log persistence recovered");
                    self.degraded = false;
                }
                Ok(())
            }
            Err(source) => {
                if !self.degraded {
                    warn!(
                        path = %path.display(),
                        error = %source,
                        "event log persistence failing; continuing in memory"
                    );
                    self.degraded = true;
                } else {
                    debug!(path = %path.display(), error = %source, "event log still not writable");
                }
                Err(EngineError::Persistence { path, source })
            }
        }
    }
}

fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}
