//! Communication link reconstruction
//!
//! - `framer` - control-byte framing of the directional byte stream
//! - `decode` - main payload to action descriptor

pub mod decode;
pub mod framer;

pub use decode::{ActionDescriptor, Location, MacroAction, decode};
pub use framer::{
    DirectionalFramer, FramerCounts, MIN_TRANSACTION_EVENTS, Transaction, TransactionFramer,
    extract_main_payload, sort_by_start,
};
