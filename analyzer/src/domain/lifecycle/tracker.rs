//! Command window correlation
//!
//! Pairs "started" and "finished" lifecycle events per command id. Distinct
//! ids may be open concurrently; a repeated start for an id that is already
//! open replaces the earlier window (last start wins) and the earlier window
//! is reported as abandoned.

use chrono::{NaiveDateTime, TimeDelta};
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::domain::error::LifecycleError;
use crate::domain::event::{LifecyclePhase, LogEvent};
use crate::domain::names::{ActionName, CommandNames};

/// Open interval for one command id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandWindow {
    pub command_id: u32,
    pub start_time: NaiveDateTime,
    pub start_label: String,
}

/// Closed command window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandRecord {
    pub command_id: u32,
    pub action_name: ActionName,
    pub start_label: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    #[serde(serialize_with = "serialize_delta_ms")]
    pub duration: TimeDelta,
}

fn serialize_delta_ms<S: serde::Serializer>(delta: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(crate::utils::time::delta_millis(*delta))
}

/// Counters kept by the tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackerCounts {
    pub started: usize,
    pub finished: usize,
    pub unmatched_finishes: usize,
    pub abandoned_windows: usize,
    pub unclosed_windows: usize,
}

/// Output of a completed tracking pass.
#[derive(Debug, Clone, Default)]
pub struct TrackerOutput {
    /// Sorted by start time, ties keep closing order
    pub records: Vec<CommandRecord>,
    pub errors: Vec<LifecycleError>,
    pub counts: TrackerCounts,
}

/// Lifecycle tracker with its open-window table.
#[derive(Debug)]
pub struct LifecycleTracker {
    names: CommandNames,
    open: FxHashMap<u32, CommandWindow>,
    records: Vec<CommandRecord>,
    errors: Vec<LifecycleError>,
    counts: TrackerCounts,
}

impl LifecycleTracker {
    pub fn new(names: CommandNames) -> Self {
        Self {
            names,
            open: FxHashMap::default(),
            records: Vec::new(),
            errors: Vec::new(),
            counts: TrackerCounts::default(),
        }
    }

    pub fn open_windows(&self) -> usize {
        self.open.len()
    }

    /// Feed one event. Events without a command payload are ignored.
    pub fn observe(&mut self, event: &LogEvent) {
        let Some(entry) = event.command_entry() else {
            return;
        };

        match entry.phase {
            LifecyclePhase::Started => {
                self.counts.started += 1;
                let window = CommandWindow {
                    command_id: entry.command_id,
                    start_time: event.timestamp,
                    start_label: entry.action_status.clone(),
                };
                if let Some(previous) = self.open.insert(entry.command_id, window) {
                    self.counts.abandoned_windows += 1;
                    tracing::warn!(
                        command_id = previous.command_id,
                        start = %previous.start_time,
                        restarted = %event.timestamp,
                        "Command restarted before finishing, earlier window abandoned"
                    );
                }
            }
            LifecyclePhase::Finished => {
                self.counts.finished += 1;
                match self.open.remove(&entry.command_id) {
                    Some(window) => self.close(window, event.timestamp),
                    None => {
                        self.counts.unmatched_finishes += 1;
                        tracing::debug!(
                            command_id = entry.command_id,
                            at = %event.timestamp,
                            "Finish without matching start, dropped"
                        );
                    }
                }
            }
            LifecyclePhase::Other => {}
        }
    }

    fn close(&mut self, window: CommandWindow, end_time: NaiveDateTime) {
        let duration = end_time - window.start_time;
        if duration < TimeDelta::zero() {
            tracing::warn!(
                command_id = window.command_id,
                start = %window.start_time,
                end = %end_time,
                "Negative command duration, record rejected"
            );
            self.errors.push(LifecycleError::negative_duration(
                window.command_id,
                window.start_time,
                end_time,
                duration,
            ));
            return;
        }

        let action_name = self.names.resolve(window.command_id);
        if let ActionName::Unknown(command_id) = action_name {
            self.errors
                .push(LifecycleError::UnknownCommand { command_id });
        }

        self.records.push(CommandRecord {
            command_id: window.command_id,
            action_name,
            start_label: window.start_label,
            start_time: window.start_time,
            end_time,
            duration,
        });
    }

    /// End of input: drop open windows and return sorted records.
    pub fn finish(mut self) -> TrackerOutput {
        self.counts.unclosed_windows = self.open.len();
        if !self.open.is_empty() {
            tracing::debug!(
                count = self.open.len(),
                "Discarding command windows still open at end of input"
            );
        }
        self.records.sort_by_key(|r| r.start_time);
        TrackerOutput {
            records: self.records,
            errors: self.errors,
            counts: self.counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::CommandEntry;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn event(time: NaiveDateTime, command_id: u32, phase: LifecyclePhase) -> LogEvent {
        let action_status = match phase {
            LifecyclePhase::Started => "SHM_Updated",
            LifecyclePhase::Finished => "Finish",
            LifecyclePhase::Other => "Running",
        };
        LogEvent::command(
            time,
            CommandEntry {
                command_id,
                status: "Info".to_string(),
                action_code: 1,
                action_status: action_status.to_string(),
                phase,
            },
        )
    }

    fn run(events: &[LogEvent]) -> TrackerOutput {
        let mut tracker = LifecycleTracker::new(CommandNames::builtin());
        for e in events {
            tracker.observe(e);
        }
        tracker.finish()
    }

    #[test]
    fn test_start_finish_pair() {
        let out = run(&[
            event(at(10, 0, 0, 0), 517, LifecyclePhase::Started),
            event(at(10, 0, 1, 250), 517, LifecyclePhase::Finished),
        ]);
        assert_eq!(out.records.len(), 1);
        let record = &out.records[0];
        assert_eq!(record.command_id, 517);
        assert_eq!(record.action_name, ActionName::Resolved("HALT".to_string()));
        assert_eq!(record.duration, TimeDelta::milliseconds(1250));
        assert_eq!(record.start_label, "SHM_Updated");
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_finish_without_start_is_dropped() {
        let out = run(&[event(at(10, 0, 0, 0), 517, LifecyclePhase::Finished)]);
        assert!(out.records.is_empty());
        assert_eq!(out.counts.unmatched_finishes, 1);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn test_concurrent_commands_sorted_by_start() {
        let out = run(&[
            event(at(10, 0, 0, 0), 514, LifecyclePhase::Started),
            event(at(10, 0, 0, 100), 517, LifecyclePhase::Started),
            event(at(10, 0, 0, 200), 517, LifecyclePhase::Finished),
            event(at(10, 0, 5, 0), 514, LifecyclePhase::Finished),
        ]);
        let ids: Vec<u32> = out.records.iter().map(|r| r.command_id).collect();
        assert_eq!(ids, vec![514, 517]);
        assert_eq!(out.records[1].duration, TimeDelta::milliseconds(100));
    }

    #[test]
    fn test_restart_abandons_previous_window() {
        let out = run(&[
            event(at(10, 0, 0, 0), 517, LifecyclePhase::Started),
            event(at(10, 0, 2, 0), 517, LifecyclePhase::Started),
            event(at(10, 0, 3, 0), 517, LifecyclePhase::Finished),
        ]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].start_time, at(10, 0, 2, 0));
        assert_eq!(out.counts.abandoned_windows, 1);
    }

    #[test]
    fn test_unknown_command_is_flagged() {
        let out = run(&[
            event(at(10, 0, 0, 0), 9999, LifecyclePhase::Started),
            event(at(10, 0, 1, 0), 9999, LifecyclePhase::Finished),
        ]);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].action_name, ActionName::Unknown(9999));
        assert_eq!(
            out.errors,
            vec![LifecycleError::UnknownCommand { command_id: 9999 }]
        );
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let out = run(&[
            event(at(10, 0, 5, 0), 517, LifecyclePhase::Started),
            event(at(10, 0, 1, 0), 517, LifecyclePhase::Finished),
        ]);
        assert!(out.records.is_empty());
        assert!(matches!(
            out.errors[0],
            LifecycleError::NegativeDuration {
                command_id: 517,
                delta_ms: -4000,
                ..
            }
        ));
    }

    #[test]
    fn test_open_windows_flushed_at_end() {
        let mut tracker = LifecycleTracker::new(CommandNames::builtin());
        tracker.observe(&event(at(10, 0, 0, 0), 517, LifecyclePhase::Started));
        tracker.observe(&event(at(10, 0, 0, 0), 518, LifecyclePhase::Other));
        assert_eq!(tracker.open_windows(), 1);
        let out = tracker.finish();
        assert!(out.records.is_empty());
        assert_eq!(out.counts.unclosed_windows, 1);
    }

    #[test]
    fn test_durations_never_negative() {
        let mut events = Vec::new();
        for i in 0..20u32 {
            let id = 514 + (i % 5);
            events.push(event(at(10, 0, i, 0), id, LifecyclePhase::Started));
            events.push(event(at(10, 0, i, 500), id, LifecyclePhase::Finished));
        }
        let out = run(&events);
        assert_eq!(out.records.len(), 20);
        for record in &out.records {
            assert!(record.end_time >= record.start_time);
            assert!(record.duration >= TimeDelta::zero());
        }
    }
}
