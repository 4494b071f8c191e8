use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Declared kind of a root variable. Always kept in step with the runtime
/// shape of the entry's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl VarType {
    /// Null has no kind of its own; it is reported as `object` so that
    /// callers branching on the type treat it as an empty structure.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => Self::String,
            Value::Number(_) => Self::Number,
            Value::Bool(_) => Self::Boolean,
            Value::Array(_) => Self::Array,
            Value::Object(_) | Value::Null => Self::Object,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn default_value(&self) -> Value {
        match self {
            Self::String => Value::String(String::new()),
            Self::Number => Value::from(0),
            Self::Boolean => Value::Bool(false),
            Self::Object => Value::Object(Map::new()),
            Self::Array => Value::Array(Vec::new()),
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        Self::of(value) == *self
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry {
    #[serde(rename = "type")]
    pub var_type: VarType,
    pub value: Value,
    #[serde(default)]
    pub hidden: bool,
}

impl VariableEntry {
    pub fn new(value: Value, hidden: bool) -> Self {
        Self {
            var_type: VarType::of(&value),
            value,
            hidden,
        }
    }

    /// Re-derives the declared type from the current value. Returns true when
    /// the declared type had drifted.
    pub fn sync_type(&mut self) -> bool {
        let actual = VarType::of(&self.value);
        if actual == self.var_type {
            return false;
        }
        self.var_type = actual;
        true
    }
}

/// Text form used when a value is spliced into a template: strings verbatim,
/// null as nothing, containers as compact JSON.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Short single-line preview for logs.
pub fn value_preview(value: &Value, max_chars: usize) -> String {
    let text = value.to_string();
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}
