//! Transaction framing
//!
//! One [`DirectionalFramer`] runs per direction over the same ordered event
//! stream:
//!
//! ```text
//!   Idle ──(0x05 in own direction)──▶ Open ──(0x06 from acknowledging side)──▶ emit
//!                                      │  ▲
//!                                      └──┘ append every other event
//! ```
//!
//! The acknowledging side is the peer of whoever sent the separator (`0x04`),
//! or the peer of the opening side while no separator has been seen. A second
//! start in the own direction discards the open transaction. Transactions with
//! fewer than [`MIN_TRANSACTION_EVENTS`] events are incomplete handshakes and
//! are dropped.
//!
//! When both directions are open at once, [`TransactionFramer`] hands each
//! separator and each closing acknowledge to exactly one of them; the other
//! framer never sees that byte.

use chrono::{NaiveDateTime, TimeDelta};
use serde::Serialize;

use super::decode::{ActionDescriptor, decode};
use crate::domain::error::DecodeError;
use crate::domain::event::{CTRL_ACK, ControlByte, Direction, LogEvent, hex_spaced};

/// Smallest event count of a complete handshake
pub const MIN_TRANSACTION_EVENTS: usize = 4;

/// A closed request/acknowledge exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Side that sent the opening `0x05`
    pub direction: Direction,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    /// Framed events from the opening to the closing control byte
    pub events: Vec<LogEvent>,
    /// Side that sent the first separator, if any
    pub separator_direction: Option<Direction>,
    pub main_payload: Vec<u8>,
    /// `None` when the payload is empty and decoding was skipped
    pub decoded_action: Option<Result<ActionDescriptor, DecodeError>>,
}

impl Transaction {
    pub fn duration(&self) -> TimeDelta {
        self.end_time - self.start_time
    }

    pub fn payload_hex(&self) -> String {
        hex_spaced(&self.main_payload)
    }

    /// Decode the main payload, skipping empty payloads.
    pub fn decode(mut self) -> Self {
        self.decoded_action = if self.main_payload.is_empty() {
            None
        } else {
            Some(decode(&self.main_payload))
        };
        self
    }

    /// True when decoding ran but could not produce a full descriptor.
    pub fn is_partially_decoded(&self) -> bool {
        match &self.decoded_action {
            Some(Ok(action)) => action.is_incomplete(),
            Some(Err(_)) => true,
            None => false,
        }
    }

    /// Human-readable meaning of the payload.
    pub fn description(&self) -> Option<String> {
        self.decoded_action.as_ref().map(|decoded| match decoded {
            Ok(action) => action.to_string(),
            Err(err) => format!("undecodable: {}", err),
        })
    }

    /// One line per framed event, `HH:MM:SS.mmm Snd: 05`.
    pub fn transcript(&self) -> String {
        self.events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Extract the main payload from a framed event sequence.
///
/// Starts after the first separator. Bytes produced by the separator's side
/// are concatenated up to and including an acknowledge byte from that same
/// side; an acknowledge from the other side ends the payload without being
/// included. Returns the separator's direction and the payload bytes.
pub fn extract_main_payload(events: &[LogEvent]) -> (Option<Direction>, Vec<u8>) {
    let Some(position) = events
        .iter()
        .position(|e| e.control() == Some(ControlByte::Separator))
    else {
        return (None, Vec::new());
    };
    let sender = events[position].direction;
    let mut payload = Vec::new();

    for event in &events[position + 1..] {
        let Some(token) = event.token() else {
            continue;
        };
        let is_ack = token.control() == Some(ControlByte::Ack);
        if event.direction == sender {
            if is_ack {
                payload.push(CTRL_ACK);
                break;
            }
            payload.extend_from_slice(&token.bytes);
        } else if is_ack {
            break;
        }
    }

    (Some(sender), payload)
}

/// Framing counters, summed across directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FramerCounts {
    pub transactions: usize,
    /// Closed with fewer than the minimum number of events
    pub incomplete_handshakes: usize,
    /// Replaced by a new start before closing
    pub restarted: usize,
    /// Still open at end of input
    pub unclosed: usize,
}

impl FramerCounts {
    pub fn merge(self, other: FramerCounts) -> Self {
        Self {
            transactions: self.transactions + other.transactions,
            incomplete_handshakes: self.incomplete_handshakes + other.incomplete_handshakes,
            restarted: self.restarted + other.restarted,
            unclosed: self.unclosed + other.unclosed,
        }
    }
}

#[derive(Debug)]
struct OpenTransaction {
    events: Vec<LogEvent>,
    separator: Option<Direction>,
}

/// Framing state machine for transactions opened by one direction.
#[derive(Debug)]
pub struct DirectionalFramer {
    direction: Direction,
    open: Option<OpenTransaction>,
    counts: FramerCounts,
}

impl DirectionalFramer {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            open: None,
            counts: FramerCounts::default(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Open and still waiting for its first separator.
    pub fn awaits_separator(&self) -> bool {
        self.open.as_ref().is_some_and(|open| open.separator.is_none())
    }

    /// Side whose acknowledge would close the open transaction.
    pub fn acknowledging(&self) -> Option<Direction> {
        self.open
            .as_ref()
            .map(|open| open.separator.unwrap_or(self.direction).opposite())
    }

    fn separator_seen(&self) -> bool {
        self.open.as_ref().is_some_and(|open| open.separator.is_some())
    }

    /// Feed one event; returns a transaction when this event closes one.
    pub fn observe(&mut self, event: &LogEvent) -> Option<Transaction> {
        if event.token().is_none() {
            return None;
        }

        if event.is_control(self.direction, ControlByte::Start) {
            if let Some(previous) = self.open.take() {
                self.counts.restarted += 1;
                tracing::debug!(
                    direction = %self.direction,
                    events = previous.events.len(),
                    at = %event.timestamp,
                    "Transaction restarted before acknowledgement, discarding"
                );
            }
            self.open = Some(OpenTransaction {
                events: vec![event.clone()],
                separator: None,
            });
            return None;
        }

        // The peer's start byte opens the peer's own transaction
        if event.is_control(self.direction.opposite(), ControlByte::Start) {
            return None;
        }

        let open = self.open.as_mut()?;
        open.events.push(event.clone());

        match event.control() {
            Some(ControlByte::Separator) if open.separator.is_none() => {
                open.separator = Some(event.direction);
                None
            }
            Some(ControlByte::Ack) => {
                let acknowledging = open.separator.unwrap_or(self.direction).opposite();
                if event.direction != acknowledging {
                    return None;
                }
                let closed = self.open.take()?;
                self.close(closed)
            }
            _ => None,
        }
    }

    fn close(&mut self, open: OpenTransaction) -> Option<Transaction> {
        if open.events.len() < MIN_TRANSACTION_EVENTS {
            self.counts.incomplete_handshakes += 1;
            tracing::trace!(
                direction = %self.direction,
                events = open.events.len(),
                "Incomplete handshake dropped"
            );
            return None;
        }

        let start_time = open.events.first()?.timestamp;
        let end_time = open.events.last()?.timestamp;
        let (separator_direction, main_payload) = extract_main_payload(&open.events);
        self.counts.transactions += 1;

        Some(Transaction {
            direction: self.direction,
            start_time,
            end_time,
            events: open.events,
            separator_direction,
            main_payload,
            decoded_action: None,
        })
    }

    /// End of input: drop any open transaction and return the counters.
    pub fn finish(mut self) -> FramerCounts {
        if let Some(open) = self.open.take() {
            self.counts.unclosed += 1;
            tracing::debug!(
                direction = %self.direction,
                events = open.events.len(),
                "Discarding transaction still open at end of input"
            );
        }
        self.counts
    }
}

/// Both directional framers over one event stream.
#[derive(Debug)]
pub struct TransactionFramer {
    outbound: DirectionalFramer,
    inbound: DirectionalFramer,
    /// Direction of the most recent start byte
    latest: Option<Direction>,
}

impl Default for TransactionFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionFramer {
    pub fn new() -> Self {
        Self {
            outbound: DirectionalFramer::new(Direction::Outbound),
            inbound: DirectionalFramer::new(Direction::Inbound),
            latest: None,
        }
    }

    /// Framers ordered most recently started first.
    fn by_recency(&self) -> [&DirectionalFramer; 2] {
        match self.latest {
            Some(Direction::Inbound) => [&self.inbound, &self.outbound],
            _ => [&self.outbound, &self.inbound],
        }
    }

    /// Direction of the framer that owns this separator or acknowledge byte.
    ///
    /// A separator goes to the most recently started transaction still
    /// waiting for one. An acknowledge goes to a transaction it closes,
    /// preferring one that has seen its separator. `None` means the byte
    /// closes nothing and is ordinary traffic for every open transaction.
    fn claimant(&self, event: &LogEvent) -> Option<Direction> {
        let framers = self.by_recency();
        match event.control()? {
            ControlByte::Separator => framers
                .into_iter()
                .find(|f| f.awaits_separator())
                .map(DirectionalFramer::direction),
            ControlByte::Ack => {
                let closes = |f: &DirectionalFramer| f.acknowledging() == Some(event.direction);
                framers
                    .into_iter()
                    .find(|f| closes(*f) && f.separator_seen())
                    .or_else(|| framers.into_iter().find(|f| closes(*f)))
                    .map(DirectionalFramer::direction)
            }
            ControlByte::Start => None,
        }
    }

    /// Feed one event to both directions; yields zero, one or two transactions.
    pub fn observe(&mut self, event: &LogEvent) -> impl Iterator<Item = Transaction> + use<> {
        let claimant = self.claimant(event);
        let mut closed = [None, None];
        for (slot, framer) in [&mut self.outbound, &mut self.inbound]
            .into_iter()
            .enumerate()
        {
            if claimant.is_some_and(|owner| owner != framer.direction) {
                continue;
            }
            closed[slot] = framer.observe(event);
        }
        if event.control() == Some(ControlByte::Start) {
            self.latest = Some(event.direction);
        }
        closed.into_iter().flatten()
    }

    pub fn finish(self) -> FramerCounts {
        self.outbound.finish().merge(self.inbound.finish())
    }
}

/// Order transactions from both directions by start time, stable for ties.
pub fn sort_by_start(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|t| t.start_time);
}

#[cfg(test)]
#[path = "framer_tests.rs"]
mod tests;
