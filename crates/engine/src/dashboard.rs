//! Process × category status grid built from an event snapshot.
//!
//! Rows are plant areas (a rule's `process`, falling back to its tag's),
//! columns are rule categories. A cell is `active` while any of its rules
//! has an ACTIVE event.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use ccp_core::{Event, EventStatus};
use ccp_rules::RuleSet;

const UNASSIGNED: &str = "Unassigned";
const GENERAL: &str = "General";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellStatus {
    Ok,
    Active,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub event_id: String,
    pub rule_id: String,
    pub status: EventStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl From<&Event> for EventSummary {
    fn from(e: &Event) -> Self {
        Self {
            event_id: e.event_id.clone(),
            rule_id: e.rule_id.clone(),
            status: e.status,
            start_time: e.start_time,
            end_time: e.end_time,
            annotation: e.annotation.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardCell {
    pub category: String,
    pub status: CellStatus,
    pub rules: Vec<String>,
    pub active_events: Vec<EventSummary>,
    /// Most recent ACTIVE or RESOLVED event of any rule in the cell.
    pub last_event: Option<EventSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardRow {
    pub process: String,
    pub cells: Vec<DashboardCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub categories: Vec<String>,
    pub rows: Vec<DashboardRow>,
}

impl DashboardView {
    /// Build the grid. CANDIDATE events are not shown.
    pub fn from_snapshot(rules: &RuleSet, events: &[Event]) -> Self {
        let mut grid: BTreeMap<String, BTreeMap<String, DashboardCell>> = BTreeMap::new();
        let mut cell_of: BTreeMap<&str, (String, String)> = BTreeMap::new();

        for rule in rules.rules() {
            let process = rule.process.clone().unwrap_or_else(|| UNASSIGNED.to_string());
            let category = rule.category.clone().unwrap_or_else(|| GENERAL.to_string());
            grid.entry(process.clone())
                .or_default()
                .entry(category.clone())
                .or_insert_with(|| DashboardCell {
                    category: category.clone(),
                    status: CellStatus::Ok,
                    rules: Vec::new(),
                    active_events: Vec::new(),
                    last_event: None,
                })
                .rules
                .push(rule.rule_id.clone());
            cell_of.insert(rule.rule_id.as_str(), (process, category));
        }

        for event in events.iter().filter(|e| e.status != EventStatus::Candidate) {
            let Some((process, category)) = cell_of.get(event.rule_id.as_str()) else {
                continue;
            };
            let Some(cell) = grid.get_mut(process).and_then(|row| row.get_mut(category)) else {
                continue;
            };
            if event.status == EventStatus::Active {
                cell.status = CellStatus::Active;
                cell.active_events.push(event.into());
            }
            let newer = cell
                .last_event
                .as_ref()
                .map_or(true, |last| event.start_time >= last.start_time);
            if newer {
                cell.last_event = Some(event.into());
            }
        }

        let mut categories: Vec<String> = grid
            .values()
            .flat_map(|row| row.keys().cloned())
            .collect();
        categories.sort();
        categories.dedup();

        let rows = grid
            .into_iter()
            .map(|(process, cells)| DashboardRow {
                process,
                cells: cells.into_values().collect(),
            })
            .collect();

        Self { categories, rows }
    }

    pub fn active_cells(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| &r.cells)
            .filter(|c| c.status == CellStatus::Active)
            .count()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
