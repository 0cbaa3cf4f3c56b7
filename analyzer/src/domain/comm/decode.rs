//! Main payload decoding
//!
//! The first payload byte is a fixed protocol tag; the second selects the
//! action and therefore how many of the following bytes carry fields:
//!
//! | action | meaning          | fields                                        |
//! |--------|------------------|-----------------------------------------------|
//! | `0x01` | status read      | -                                             |
//! | `0x08` | set speed        | `[2]` speed                                   |
//! | `0x06` | clear error      | -                                             |
//! | `0x22` | full reset       | -                                             |
//! | `0x21` | macro            | `[2]` sub-action, pick/place/prepare `[4..=6]` |
//! | `0x62` | completion       | `[2]` completed action                        |
//! | `0x63` | failure          | `[2]` action, `[3]` type, `[4]` code          |
//! | `0x70` | IO event         | `[2]` new mask, `[3]` old mask                |
//! | `0x71` | mode switch      | `[2]` mode                                    |
//! | `0x61` | status acquired  | -                                             |
//!
//! Missing field bytes produce [`ActionDescriptor::Incomplete`], never a panic.

use std::fmt;

use serde::Serialize;

use crate::domain::error::DecodeError;

pub const ACTION_STATUS_READ: u8 = 0x01;
pub const ACTION_SET_SPEED: u8 = 0x08;
pub const ACTION_CLEAR_ERROR: u8 = 0x06;
pub const ACTION_RESET: u8 = 0x22;
pub const ACTION_MACRO: u8 = 0x21;
pub const ACTION_COMPLETION: u8 = 0x62;
pub const ACTION_FAILURE: u8 = 0x63;
pub const ACTION_IO_EVENT: u8 = 0x70;
pub const ACTION_MODE_SWITCH: u8 = 0x71;
pub const ACTION_STATUS_ACQUIRED: u8 = 0x61;

pub const MACRO_PICK: u8 = 0x04;
pub const MACRO_PLACE: u8 = 0x05;
pub const MACRO_PREPARE: u8 = 0x0c;

/// Where a pick/place/prepare macro operates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Location {
    pub station: u8,
    pub layer: u8,
    pub arm: u8,
}

/// Sub-action of an execute-macro request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "macro", rename_all = "snake_case")]
pub enum MacroAction {
    Pick(Location),
    Place(Location),
    Prepare(Location),
    Other { code: u8 },
}

/// Decoded meaning of a main payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionDescriptor {
    StatusRead,
    SetSpeed { speed: u8 },
    ClearError,
    Reset,
    Macro(MacroAction),
    Completion { action: u8 },
    Failure {
        action: u8,
        error_type: u8,
        error_code: u8,
    },
    IoEvent { new_mask: u8, old_mask: u8 },
    ModeSwitch { mode: u8 },
    StatusAcquired,
    Unrecognized { action: u8 },
    /// Action byte known but the payload ends before its fields do
    Incomplete {
        action: u8,
        needed: usize,
        available: usize,
    },
}

impl ActionDescriptor {
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ActionDescriptor::Incomplete { .. })
    }
}

/// Decode a main payload.
pub fn decode(payload: &[u8]) -> Result<ActionDescriptor, DecodeError> {
    let [_tag, action, ..] = payload else {
        return Err(DecodeError::TooShort { len: payload.len() });
    };
    let fields = Fields {
        bytes: payload,
        action: *action,
    };

    let descriptor = match *action {
        ACTION_STATUS_READ => ActionDescriptor::StatusRead,
        ACTION_CLEAR_ERROR => ActionDescriptor::ClearError,
        ACTION_RESET => ActionDescriptor::Reset,
        ACTION_STATUS_ACQUIRED => ActionDescriptor::StatusAcquired,
        ACTION_SET_SPEED => match fields.take::<1>(2) {
            Ok([speed]) => ActionDescriptor::SetSpeed { speed },
            Err(incomplete) => incomplete,
        },
        ACTION_MACRO => decode_macro(&fields),
        ACTION_COMPLETION => match fields.take::<1>(2) {
            Ok([action]) => ActionDescriptor::Completion { action },
            Err(incomplete) => incomplete,
        },
        ACTION_FAILURE => match fields.take::<3>(2) {
            Ok([action, error_type, error_code]) => ActionDescriptor::Failure {
                action,
                error_type,
                error_code,
            },
            Err(incomplete) => incomplete,
        },
        ACTION_IO_EVENT => match fields.take::<2>(2) {
            Ok([new_mask, old_mask]) => ActionDescriptor::IoEvent { new_mask, old_mask },
            Err(incomplete) => incomplete,
        },
        ACTION_MODE_SWITCH => match fields.take::<1>(2) {
            Ok([mode]) => ActionDescriptor::ModeSwitch { mode },
            Err(incomplete) => incomplete,
        },
        other => ActionDescriptor::Unrecognized { action: other },
    };

    Ok(descriptor)
}

fn decode_macro(fields: &Fields<'_>) -> ActionDescriptor {
    let sub = match fields.take::<1>(2) {
        Ok([sub]) => sub,
        Err(incomplete) => return incomplete,
    };
    let located: fn(Location) -> MacroAction = match sub {
        MACRO_PICK => MacroAction::Pick,
        MACRO_PLACE => MacroAction::Place,
        MACRO_PREPARE => MacroAction::Prepare,
        code => return ActionDescriptor::Macro(MacroAction::Other { code }),
    };
    // byte[3] is reserved
    match fields.take::<3>(4) {
        Ok([station, layer, arm]) => ActionDescriptor::Macro(located(Location {
            station,
            layer,
            arm,
        })),
        Err(incomplete) => incomplete,
    }
}

/// Bounds-checked field access for one payload.
struct Fields<'a> {
    bytes: &'a [u8],
    action: u8,
}

impl Fields<'_> {
    /// `N` consecutive bytes starting at `offset`.
    fn take<const N: usize>(&self, offset: usize) -> Result<[u8; N], ActionDescriptor> {
        self.bytes
            .get(offset..offset + N)
            .and_then(|slice| <[u8; N]>::try_from(slice).ok())
            .ok_or(ActionDescriptor::Incomplete {
                action: self.action,
                needed: offset + N,
                available: self.bytes.len(),
            })
    }
}

fn completion_label(action: u8) -> Option<&'static str> {
    match action {
        ACTION_MACRO => Some("macro finished"),
        ACTION_SET_SPEED => Some("speed set"),
        ACTION_CLEAR_ERROR => Some("error cleared"),
        _ => None,
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station {}, layer {}, arm {}",
            self.station, self.layer, self.arm
        )
    }
}

impl fmt::Display for MacroAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroAction::Pick(loc) => write!(f, "pick: {}", loc),
            MacroAction::Place(loc) => write!(f, "place: {}", loc),
            MacroAction::Prepare(loc) => write!(f, "prepare: {}", loc),
            MacroAction::Other { code } => write!(f, "macro action 0x{:02x}", code),
        }
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionDescriptor::StatusRead => f.write_str("status read request"),
            ActionDescriptor::SetSpeed { speed } => write!(f, "set speed: {}", speed),
            ActionDescriptor::ClearError => f.write_str("clear error"),
            ActionDescriptor::Reset => f.write_str("full reset"),
            ActionDescriptor::Macro(action) => write!(f, "{}", action),
            ActionDescriptor::Completion { action } => match completion_label(*action) {
                Some(label) => f.write_str(label),
                None => write!(f, "action completed: 0x{:02x}", action),
            },
            ActionDescriptor::Failure {
                action,
                error_type,
                error_code,
            } => write!(
                f,
                "failure executing action 0x{:02x}: type 0x{:02x}, code 0x{:02x}",
                action, error_type, error_code
            ),
            ActionDescriptor::IoEvent { new_mask, old_mask } => write!(
                f,
                "IO event: new 0x{:02x}, old 0x{:02x}",
                new_mask, old_mask
            ),
            ActionDescriptor::ModeSwitch { mode } => write!(f, "mode switch: {}", mode),
            ActionDescriptor::StatusAcquired => f.write_str("status acquired"),
            ActionDescriptor::Unrecognized { action } => {
                write!(f, "unrecognized action 0x{:02x}", action)
            }
            ActionDescriptor::Incomplete {
                action,
                needed,
                available,
            } => write!(
                f,
                "action 0x{:02x}: fields incomplete ({} of {} bytes)",
                action, available, needed
            ),
        }
    }
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
