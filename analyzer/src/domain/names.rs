//! Command name lookup
//!
//! Maps numeric command ids from the control log to readable action names.
//! The table is injected into the lifecycle tracker so tests and config files
//! can supply their own entries.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::error::LifecycleError;

/// Built-in controller command table.
const DEFAULT_COMMANDS: &[(u32, &str)] = &[
    (258, "SET_DO"),
    (514, "HOME_GRP"),
    (515, "STOP_GRP"),
    (517, "HALT"),
    (518, "CONTINUE"),
    (519, "ACK_GRP"),
    (528, "ADIT_UCS"),
    (769, "PUT_RDY_APP"),
    (770, "GET_RDY_APP"),
    (771, "TRG_RDY_APP"),
    (772, "EXTA_APP"),
    (773, "RETA_APP"),
    (774, "SAFE_R_APP"),
    (775, "SAFE_CST_APP"),
    (776, "TEACH_APP"),
    (777, "MPRDY_APP"),
    (778, "MPMOYION_APP"),
    (779, "ZGRDY_APP"),
    (780, "ZPRDY_APP"),
    (781, "RSWAP_APP"),
    (782, "NRDY_APP"),
    (783, "ROTATE_APP"),
    (1025, "PAR_UPDATE"),
    (1026, "CST_UPDATE"),
    (1027, "ADD_MONITOR"),
    (1028, "DEL_MONITOR"),
];

/// Read-only command id to name mapping.
#[derive(Debug, Clone, Default)]
pub struct CommandNames {
    names: HashMap<u32, String>,
}

impl CommandNames {
    pub fn new(names: HashMap<u32, String>) -> Self {
        Self { names }
    }

    /// The controller's standard command table.
    pub fn builtin() -> Self {
        Self::new(
            DEFAULT_COMMANDS
                .iter()
                .map(|(id, name)| (*id, (*name).to_string()))
                .collect(),
        )
    }

    /// Add or replace entries (other takes precedence).
    pub fn with_overrides(mut self, overrides: &HashMap<u32, String>) -> Self {
        for (id, name) in overrides {
            self.names.insert(*id, name.clone());
        }
        self
    }

    pub fn lookup(&self, command_id: u32) -> Result<&str, LifecycleError> {
        self.names
            .get(&command_id)
            .map(String::as_str)
            .ok_or(LifecycleError::UnknownCommand { command_id })
    }

    /// Resolve a command id, keeping unknown ids distinguishable.
    pub fn resolve(&self, command_id: u32) -> ActionName {
        match self.lookup(command_id) {
            Ok(name) => ActionName::Resolved(name.to_string()),
            Err(_) => ActionName::Unknown(command_id),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Name attached to a command record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ActionName {
    Resolved(String),
    Unknown(u32),
}

impl ActionName {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ActionName::Resolved(_))
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionName::Resolved(name) => f.write_str(name),
            ActionName::Unknown(id) => write!(f, "UNKNOWN({})", id),
        }
    }
}
