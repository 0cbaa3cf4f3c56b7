//! Trace line parsing
//!
//! Turns one raw line into a [`LogEvent`]. Two grammars are supported:
//!
//! ```text
//! Lifecycle:      10:15:02.123 [CmdID / UniID = [517 ][Info][1234 SHM_Updated run]
//! Communication:  Debug:  2024-09-24 10:15:02.123: Snd: 05
//! ```
//!
//! Lines that do not match are dropped (`None`); they are never fatal.
//! Lifecycle action status text is classified into a [`LifecyclePhase`] here so
//! that downstream stages never scan free text.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::event::{
    CTRL_ACK, CTRL_SEPARATOR, CTRL_START, CommandEntry, Direction, LifecyclePhase, LogEvent,
};
use crate::core::constants::{DEFAULT_FINISHED_MARKER, DEFAULT_STARTED_MARKER};
use crate::utils::time::parse_trace_timestamp;

/// Line grammar of an input trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Grammar {
    /// Command-lifecycle log (control log)
    Lifecycle,
    /// Directional byte log (communication log)
    Communication,
}

/// Substrings of the action status that mark a command start and finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleMarkers {
    pub started: String,
    pub finished: String,
}

impl Default for LifecycleMarkers {
    fn default() -> Self {
        Self {
            started: DEFAULT_STARTED_MARKER.to_string(),
            finished: DEFAULT_FINISHED_MARKER.to_string(),
        }
    }
}

impl LifecycleMarkers {
    /// Started wins when both markers occur in the same status text.
    pub fn classify(&self, action_status: &str) -> LifecyclePhase {
        if action_status.contains(&self.started) {
            LifecyclePhase::Started
        } else if action_status.contains(&self.finished) {
            LifecyclePhase::Finished
        } else {
            LifecyclePhase::Other
        }
    }
}

fn lifecycle_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(\d{2}:\d{2}:\d{2})(?:\.(\d+))?\s+\[CmdID / UniID = \[(\d+)\s*\]\[(\w+)\]\[(\d+)\s+(.*?)\]",
        )
        .expect("Invalid regex")
    })
}

fn communication_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:Debug:\s+)?(?:(\d{4}-\d{2}-\d{2})\s+)?(\d{2}:\d{2}:\d{2})(?:\.(\d+))?:?\s+(Snd|Rcv):\s*(.*?)\s*$",
        )
        .expect("Invalid regex")
    })
}

/// Configured line parser for one grammar.
#[derive(Debug, Clone)]
pub struct LineParser {
    grammar: Grammar,
    markers: LifecycleMarkers,
    base_date: NaiveDate,
}

impl LineParser {
    pub fn new(grammar: Grammar, markers: LifecycleMarkers, base_date: NaiveDate) -> Self {
        Self {
            grammar,
            markers,
            base_date,
        }
    }

    pub fn grammar(&self) -> Grammar {
        self.grammar
    }

    /// Parse one raw line, `None` when it does not match the grammar.
    pub fn parse(&self, line: &str) -> Option<LogEvent> {
        match self.grammar {
            Grammar::Lifecycle => self.parse_lifecycle(line),
            Grammar::Communication => self.parse_communication(line),
        }
    }

    fn parse_lifecycle(&self, line: &str) -> Option<LogEvent> {
        let caps = lifecycle_regex().captures(line)?;
        let timestamp = parse_trace_timestamp(
            None,
            group(&caps, 1)?,
            caps.get(2).map(|m| m.as_str()),
            self.base_date,
        )?;
        let command_id = group(&caps, 3)?.parse().ok()?;
        let action_code = group(&caps, 5)?.parse().ok()?;
        let action_status = group(&caps, 6)?.trim().to_string();

        Some(LogEvent::command(
            timestamp,
            CommandEntry {
                command_id,
                status: group(&caps, 4)?.to_string(),
                action_code,
                phase: self.markers.classify(&action_status),
                action_status,
            },
        ))
    }

    fn parse_communication(&self, line: &str) -> Option<LogEvent> {
        let caps = communication_regex().captures(line)?;
        let timestamp = parse_trace_timestamp(
            caps.get(1).map(|m| m.as_str()),
            group(&caps, 2)?,
            caps.get(3).map(|m| m.as_str()),
            self.base_date,
        )?;
        let direction = Direction::from_tag(group(&caps, 4)?)?;
        let bytes = parse_token(group(&caps, 5)?)?;
        Some(LogEvent::bytes(timestamp, direction, bytes))
    }
}

fn group<'a>(caps: &Captures<'a>, index: usize) -> Option<&'a str> {
    caps.get(index).map(|m| m.as_str())
}

/// Parse a communication token into bytes.
///
/// Accepts control mnemonics (`ENQ`, `EOT`, `ACK`) and hex byte strings with or
/// without separating whitespace. Empty or odd-length tokens are rejected.
pub fn parse_token(token: &str) -> Option<Vec<u8>> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    match token.to_ascii_uppercase().as_str() {
        "ENQ" => return Some(vec![CTRL_START]),
        "EOT" => return Some(vec![CTRL_SEPARATOR]),
        "ACK" => return Some(vec![CTRL_ACK]),
        _ => {}
    }
    let compact: String = token.split_whitespace().collect();
    hex::decode(compact).ok()
}
