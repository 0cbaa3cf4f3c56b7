//! Trace reconstruction domain
//!
//! - `event` - typed events produced from trace lines
//! - `parse` - line grammars for lifecycle and communication traces
//! - `names` - command id to action name table
//! - `lifecycle` - command window correlation and per-action stats
//! - `comm` - transaction framing and payload decoding
//! - `pipeline` - sequential and staged reconstruction runs

pub mod comm;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod names;
pub mod parse;
pub mod pipeline;

pub use error::{DecodeError, LifecycleError, PipelineError};
pub use event::{Direction, LogEvent};
pub use names::{ActionName, CommandNames};
pub use parse::{Grammar, LifecycleMarkers, LineParser};
pub use pipeline::{CommReport, LifecycleReport, PipelineSettings, Reconstructor, RunSummary};
