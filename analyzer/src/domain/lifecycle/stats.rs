//! Per-action duration statistics

use chrono::TimeDelta;
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::tracker::CommandRecord;
use crate::domain::names::ActionName;
use crate::utils::time::delta_millis;

/// Aggregated durations for one action name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStats {
    pub action_name: ActionName,
    pub count: usize,
    pub total: TimeDelta,
    pub min: TimeDelta,
    pub max: TimeDelta,
}

impl ActionStats {
    fn new(record: &CommandRecord) -> Self {
        Self {
            action_name: record.action_name.clone(),
            count: 1,
            total: record.duration,
            min: record.duration,
            max: record.duration,
        }
    }

    fn add(&mut self, duration: TimeDelta) {
        self.count += 1;
        self.total = self.total + duration;
        self.min = self.min.min(duration);
        self.max = self.max.max(duration);
    }

    pub fn average(&self) -> TimeDelta {
        // count is at least 1 by construction
        let count = i64::try_from(self.count).unwrap_or(i64::MAX);
        match self.total.num_microseconds() {
            Some(micros) => TimeDelta::microseconds(micros / count),
            None => TimeDelta::milliseconds(self.total.num_milliseconds() / count),
        }
    }

    /// Group records by action name in order of first appearance.
    pub fn from_records(records: &[CommandRecord]) -> Vec<ActionStats> {
        let mut index: FxHashMap<&ActionName, usize> = FxHashMap::default();
        let mut stats: Vec<ActionStats> = Vec::new();

        for record in records {
            match index.get(&record.action_name) {
                Some(&i) => stats[i].add(record.duration),
                None => {
                    index.insert(&record.action_name, stats.len());
                    stats.push(ActionStats::new(record));
                }
            }
        }

        stats
    }
}

/// Serialized form, durations in milliseconds.
#[derive(Debug, Serialize)]
pub struct ActionStatsView {
    pub action_name: String,
    pub resolved: bool,
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub total_ms: f64,
}

impl From<&ActionStats> for ActionStatsView {
    fn from(stats: &ActionStats) -> Self {
        Self {
            action_name: stats.action_name.to_string(),
            resolved: stats.action_name.is_resolved(),
            count: stats.count,
            avg_ms: delta_millis(stats.average()),
            min_ms: delta_millis(stats.min),
            max_ms: delta_millis(stats.max),
            total_ms: delta_millis(stats.total),
        }
    }
}
