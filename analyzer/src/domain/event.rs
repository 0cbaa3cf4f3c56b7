//! Typed trace events
//!
//! A [`LogEvent`] is produced once per accepted trace line by the line parser
//! and never mutated afterwards. Lifecycle lines and communication lines share
//! the event type; the payload variant tells them apart.

use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

/// Protocol control bytes that frame a transaction.
pub const CTRL_START: u8 = 0x05;
pub const CTRL_SEPARATOR: u8 = 0x04;
pub const CTRL_ACK: u8 = 0x06;

/// Direction of a byte event on the controller link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Host to controller (`Snd`)
    Outbound,
    /// Controller to host (`Rcv`)
    Inbound,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Outbound => Direction::Inbound,
            Direction::Inbound => Direction::Outbound,
        }
    }

    /// Tag used by the communication log.
    pub fn tag(self) -> &'static str {
        match self {
            Direction::Outbound => "Snd",
            Direction::Inbound => "Rcv",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "Snd" => Some(Direction::Outbound),
            "Rcv" => Some(Direction::Inbound),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Single-byte protocol markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlByte {
    Start,
    Separator,
    Ack,
}

impl ControlByte {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CTRL_START => Some(ControlByte::Start),
            CTRL_SEPARATOR => Some(ControlByte::Separator),
            CTRL_ACK => Some(ControlByte::Ack),
            _ => None,
        }
    }
}

/// Bytes carried by one communication line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ByteToken {
    pub bytes: Vec<u8>,
}

impl ByteToken {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Control marker carried by this token.
    ///
    /// Only a token consisting of exactly one byte counts; a `06` inside a
    /// longer payload is data.
    pub fn control(&self) -> Option<ControlByte> {
        match self.bytes.as_slice() {
            [byte] => ControlByte::from_byte(*byte),
            _ => None,
        }
    }

    /// Upper-case hex rendering, bytes separated by spaces.
    pub fn to_hex(&self) -> String {
        hex_spaced(&self.bytes)
    }
}

/// Lifecycle classification, decided once when the line is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    Started,
    Finished,
    Other,
}

/// Parsed command-lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandEntry {
    pub command_id: u32,
    pub status: String,
    pub action_code: u32,
    pub action_status: String,
    pub phase: LifecyclePhase,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    Command(CommandEntry),
    Bytes(ByteToken),
}

/// One accepted trace line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub timestamp: NaiveDateTime,
    pub direction: Direction,
    pub payload: Payload,
}

impl LogEvent {
    pub fn bytes(timestamp: NaiveDateTime, direction: Direction, bytes: Vec<u8>) -> Self {
        Self {
            timestamp,
            direction,
            payload: Payload::Bytes(ByteToken::new(bytes)),
        }
    }

    pub fn command(timestamp: NaiveDateTime, entry: CommandEntry) -> Self {
        // Lifecycle lines are written by the controller itself.
        Self {
            timestamp,
            direction: Direction::Outbound,
            payload: Payload::Command(entry),
        }
    }

    pub fn token(&self) -> Option<&ByteToken> {
        match &self.payload {
            Payload::Bytes(token) => Some(token),
            Payload::Command(_) => None,
        }
    }

    pub fn command_entry(&self) -> Option<&CommandEntry> {
        match &self.payload {
            Payload::Command(entry) => Some(entry),
            Payload::Bytes(_) => None,
        }
    }

    pub fn control(&self) -> Option<ControlByte> {
        self.token().and_then(ByteToken::control)
    }

    /// True when this event carries `control` in `direction`.
    pub fn is_control(&self, direction: Direction, control: ControlByte) -> bool {
        self.direction == direction && self.control() == Some(control)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.format("%H:%M:%S%.3f");
        match &self.payload {
            Payload::Bytes(token) => write!(f, "{} {}: {}", time, self.direction, token.to_hex()),
            Payload::Command(entry) => write!(
                f,
                "{} [{}][{}][{} {}]",
                time, entry.command_id, entry.status, entry.action_code, entry.action_status
            ),
        }
    }
}

/// Render bytes as `01 08 32`.
pub fn hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 24)
            .unwrap()
            .and_hms_milli_opt(10, 0, 0, 5)
            .unwrap()
    }

    #[test]
    fn test_control_requires_single_byte() {
        assert_eq!(
            ByteToken::new(vec![0x05]).control(),
            Some(ControlByte::Start)
        );
        assert_eq!(ByteToken::new(vec![0x06]).control(), Some(ControlByte::Ack));
        assert_eq!(ByteToken::new(vec![0x01, 0x06]).control(), None);
        assert_eq!(ByteToken::new(vec![0x32]).control(), None);
        assert_eq!(ByteToken::new(vec![]).control(), None);
    }

    #[test]
    fn test_direction_tags() {
        assert_eq!(Direction::from_tag("Snd"), Some(Direction::Outbound));
        assert_eq!(Direction::from_tag("Rcv"), Some(Direction::Inbound));
        assert_eq!(Direction::from_tag("snd"), None);
        assert_eq!(Direction::Outbound.opposite(), Direction::Inbound);
    }

    #[test]
    fn test_event_display() {
        let event = LogEvent::bytes(ts(), Direction::Inbound, vec![0x01, 0x08, 0x32]);
        assert_eq!(event.to_string(), "10:00:00.005 Rcv: 01 08 32");
    }

    #[test]
    fn test_is_control_checks_direction() {
        let event = LogEvent::bytes(ts(), Direction::Outbound, vec![CTRL_ACK]);
        assert!(event.is_control(Direction::Outbound, ControlByte::Ack));
        assert!(!event.is_control(Direction::Inbound, ControlByte::Ack));
        assert!(!event.is_control(Direction::Outbound, ControlByte::Start));
    }
}
