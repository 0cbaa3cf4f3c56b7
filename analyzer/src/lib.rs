//! Controller trace analyzer
//!
//! Reconstructs command execution windows from control (lifecycle) logs and
//! request/acknowledge transactions from communication logs, decoding each
//! transaction's main payload into a typed action.

mod app;
pub mod core;
pub mod domain;
pub mod utils;
