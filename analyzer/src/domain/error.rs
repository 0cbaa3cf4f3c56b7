//! Error types for trace reconstruction
//!
//! Only [`PipelineError`] aborts a run. Decode and lifecycle errors are
//! attached to the record they concern and counted in the run summary.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;
use thiserror::Error;

/// Payload could not be decoded at all.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodeError {
    /// Fewer than the two bytes needed to reach the action byte
    #[error("payload too short: {len} byte(s), need at least 2")]
    TooShort { len: usize },
}

/// Per-record lifecycle problems.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleError {
    /// Command id missing from the name table
    #[error("unknown command id {command_id}")]
    UnknownCommand { command_id: u32 },

    /// Finish timestamp precedes the start timestamp
    #[error("command {command_id} finished before it started ({start} > {end}, {delta_ms} ms)")]
    NegativeDuration {
        command_id: u32,
        start: NaiveDateTime,
        end: NaiveDateTime,
        delta_ms: i64,
    },
}

impl LifecycleError {
    pub fn negative_duration(
        command_id: u32,
        start: NaiveDateTime,
        end: NaiveDateTime,
        delta: TimeDelta,
    ) -> Self {
        LifecycleError::NegativeDuration {
            command_id,
            start,
            end,
            delta_ms: delta.num_milliseconds(),
        }
    }
}

/// Fatal pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input trace could not be read
    #[error("trace source unavailable: {0}")]
    Source(#[from] std::io::Error),

    /// A pipeline stage stopped before the input was exhausted
    #[error("pipeline stage '{stage}' failed: {reason}")]
    Stage { stage: &'static str, reason: String },
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        PipelineError::Stage {
            stage: "task",
            reason: err.to_string(),
        }
    }
}
