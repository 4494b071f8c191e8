use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};
use vc_core::{
    SetReport, ShapeConversion, StoreSnapshot, VarCommandError, VarType, VariableEntry,
};

use crate::schema::SchemaRegistry;
use crate::value_path::{coerce_incoming_value, get_path, parse_path, set_path, PathSegment};

/// Variables of one scope, keyed by root name.
#[derive(Debug, Clone)]
pub struct VariableStore {
    scope_id: String,
    entries: BTreeMap<String, VariableEntry>,
    schemas: Arc<SchemaRegistry>,
}

impl VariableStore {
    pub fn new(scope_id: impl Into<String>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            scope_id: scope_id.into(),
            entries: BTreeMap::new(),
            schemas,
        }
    }

    /// Rebuilds a store from a host snapshot. Entries whose declared type
    /// disagrees with their value are retyped from the value.
    pub fn hydrate(
        scope_id: impl Into<String>,
        snapshot: StoreSnapshot,
        schemas: Arc<SchemaRegistry>,
    ) -> Self {
        let mut store = Self::new(scope_id, schemas);
        for (name, mut entry) in snapshot {
            if entry.sync_type() {
                warn!(scope = %store.scope_id, root = %name, "hydrated entry type did not match its value");
            }
            store.entries.insert(name, entry);
        }
        store
    }

    pub fn serialize(&self) -> StoreSnapshot {
        self.entries.clone()
    }

    pub fn to_json(&self) -> Result<String, VarCommandError> {
        serde_json::to_string(&self.entries)
            .map_err(|error| VarCommandError::new("STORE_SERIALIZE", error.to_string()))
    }

    pub fn from_json(
        scope_id: impl Into<String>,
        text: &str,
        schemas: Arc<SchemaRegistry>,
    ) -> Result<Self, VarCommandError> {
        let snapshot: StoreSnapshot = serde_json::from_str(text)
            .map_err(|error| VarCommandError::new("STORE_SNAPSHOT_INVALID", error.to_string()))?;
        Ok(Self::hydrate(scope_id, snapshot, schemas))
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Entries not flagged hidden, in root-name order.
    pub fn visible_entries(&self) -> impl Iterator<Item = (&str, &VariableEntry)> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.hidden)
            .map(|(name, entry)| (name.as_str(), entry))
    }

    /// Registers `root_name` unless it already exists, in which case the
    /// existing entry is returned untouched.
    pub fn register(
        &mut self,
        root_name: &str,
        var_type: VarType,
        initial_value: Value,
        hidden: bool,
    ) -> &VariableEntry {
        let scope_id = &self.scope_id;
        self.entries.entry(root_name.to_string()).or_insert_with(|| {
            let entry = VariableEntry::new(initial_value, hidden);
            if entry.var_type != var_type {
                warn!(
                    scope = %scope_id,
                    root = %root_name,
                    declared = %var_type,
                    actual = %entry.var_type,
                    "registered value does not match declared type, using value type"
                );
            }
            entry
        })
    }

    pub fn get_root_entry(&self, root_name: &str) -> Option<&VariableEntry> {
        self.entries.get(root_name)
    }

    pub fn has(&self, path: &str) -> bool {
        self.lookup(path).is_some()
    }

    /// Borrowing read of a root name or dotted path.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let (root_name, rest) = split_root(path)?;
        let entry = self.entries.get(root_name)?;
        get_path(&entry.value, &rest)
    }

    /// Owned copy of the value at a root name or dotted path.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        self.lookup(path).cloned()
    }

    /// Writes a root name or dotted path, registering the root first when it
    /// is unknown. The entry is left untouched when the write fails.
    pub fn set_value(&mut self, path: &str, raw_value: Value) -> Result<SetReport, VarCommandError> {
        let (root_name, rest) = split_root(path).ok_or_else(|| {
            VarCommandError::new("STORE_PATH_EMPTY", format!("Invalid variable path \"{}\".", path))
        })?;

        let registered = !self.entries.contains_key(root_name);
        if registered {
            let (var_type, initial) = self.default_for_new_root(root_name, rest.is_empty());
            self.register(root_name, var_type, initial, false);
            info!(scope = %self.scope_id, root = %root_name, var_type = %var_type, "auto-registered variable");
        }

        let result = self.write_entry(root_name, &rest, raw_value);
        if result.is_err() && registered {
            self.entries.remove(root_name);
        }
        let (var_type, conversions) = result?;

        let conversions = conversions
            .into_iter()
            .map(|conversion| conversion.with_root(root_name))
            .collect::<Vec<_>>();
        for conversion in &conversions {
            warn!(scope = %self.scope_id, path = %conversion.path(), "{}", conversion);
        }

        Ok(SetReport {
            registered,
            var_type,
            conversions,
        })
    }

    pub fn set_hidden(&mut self, root_name: &str, hidden: bool) -> bool {
        match self.entries.get_mut(root_name) {
            Some(entry) => {
                entry.hidden = hidden;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, root_name: &str) -> Option<VariableEntry> {
        self.entries.remove(root_name)
    }

    fn default_for_new_root(&self, root_name: &str, bare: bool) -> (VarType, Value) {
        if let Some(default) = self.schemas.get_default(root_name) {
            return (default.var_type, default.value);
        }
        if bare {
            (VarType::String, Value::String(String::new()))
        } else {
            (VarType::Object, Value::Object(Map::new()))
        }
    }

    fn write_entry(
        &mut self,
        root_name: &str,
        rest: &[PathSegment],
        raw_value: Value,
    ) -> Result<(VarType, Vec<ShapeConversion>), VarCommandError> {
        let entry = self.entries.get_mut(root_name).ok_or_else(|| {
            VarCommandError::new(
                "STORE_ROOT_MISSING",
                format!("Variable \"{}\" is not registered.", root_name),
            )
        })?;

        let conversions = if rest.is_empty() {
            entry.value = coerce_incoming_value(raw_value);
            Vec::new()
        } else {
            let mut candidate = entry.value.clone();
            let conversions = set_path(&mut candidate, rest, raw_value)?;
            entry.value = candidate;
            conversions
        };

        entry.sync_type();
        Ok((entry.var_type, conversions))
    }
}

fn split_root(path: &str) -> Option<(&str, Vec<PathSegment>)> {
    let trimmed = path.trim();
    let (root, rest) = match trimmed.split_once('.') {
        Some((root, rest)) => (root.trim(), parse_path(rest)),
        None => (trimmed, Vec::new()),
    };
    if root.is_empty() {
        return None;
    }
    Some((root, rest))
}
