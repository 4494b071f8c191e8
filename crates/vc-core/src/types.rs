use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{VarType, VariableEntry};

pub const GLOBAL_SCOPE: &str = "global";
pub const CHARACTER_SCOPE_PREFIX: &str = "character:";

pub fn character_scope(character_id: &str) -> String {
    format!("{}{}", CHARACTER_SCOPE_PREFIX, character_id)
}

/// Plain root name -> entry mapping handed to and from the host's storage.
pub type StoreSnapshot = BTreeMap<String, VariableEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandOutcome {
    Registered,
    Updated,
    Failed,
}

impl CommandOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Updated => "updated",
            Self::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub path: String,
    pub outcome: CommandOutcome,
    pub detail: String,
}

impl fmt::Display for CommandLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.outcome.name(), self.path, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub clean_text: String,
    pub logs: Vec<CommandLogEntry>,
    pub changed: bool,
}

/// A container rewritten in place because a write path needed the other kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeConversion {
    /// Keys that are not array indices cannot survive the conversion and are
    /// listed in `dropped_keys`.
    ObjectToArray {
        path: String,
        dropped_keys: Vec<String>,
    },
    ArrayToObject {
        path: String,
    },
}

impl ShapeConversion {
    pub fn path(&self) -> &str {
        match self {
            Self::ObjectToArray { path, .. } | Self::ArrayToObject { path } => path,
        }
    }

    pub fn with_root(self, root: &str) -> Self {
        let join = |path: String| {
            if path.is_empty() {
                root.to_string()
            } else {
                format!("{}.{}", root, path)
            }
        };
        match self {
            Self::ObjectToArray { path, dropped_keys } => Self::ObjectToArray {
                path: join(path),
                dropped_keys,
            },
            Self::ArrayToObject { path } => Self::ArrayToObject { path: join(path) },
        }
    }
}

impl fmt::Display for ShapeConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectToArray { path, dropped_keys } => {
                write!(f, "converted {} from object to array", path)?;
                if !dropped_keys.is_empty() {
                    write!(f, " (dropped keys: {})", dropped_keys.join(", "))?;
                }
                Ok(())
            }
            Self::ArrayToObject { path } => write!(f, "converted {} from array to object", path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReport {
    pub registered: bool,
    pub var_type: VarType,
    pub conversions: Vec<ShapeConversion>,
}
