//! Command lifecycle reconstruction
//!
//! - `tracker` - start/finish correlation into command records
//! - `stats` - per-action duration aggregation

mod stats;
mod tracker;

pub use stats::{ActionStats, ActionStatsView};
pub use tracker::{CommandRecord, CommandWindow, LifecycleTracker, TrackerCounts, TrackerOutput};
