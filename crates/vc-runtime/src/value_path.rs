use std::fmt;

use serde_json::{Map, Value};
use vc_core::{ShapeConversion, VarCommandError, VarType};

/// Largest index a write may address. Model output can name any index, and a
/// sparse write pads the array with nulls up to it.
pub const MAX_ARRAY_INDEX: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|byte| byte.is_ascii_digit()) {
            if let Ok(index) = raw.parse::<usize>() {
                return Self::Index(index);
            }
        }
        Self::Key(raw.to_string())
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    fn as_key(&self) -> String {
        match self {
            Self::Key(key) => key.clone(),
            Self::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{}", index),
        }
    }
}

pub fn parse_path(path: &str) -> Vec<PathSegment> {
    path.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(PathSegment::parse)
        .collect()
}

/// Walks `path` below `root`. Any missing or mismatched step yields `None`.
/// A numeric segment against an object is looked up as a string key.
pub fn get_path<'a>(root: &'a Value, path: &[PathSegment]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |current, segment| match (current, segment) {
            (Value::Object(map), segment) => map.get(segment.as_key().as_str()),
            (Value::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        })
}

/// Strings that look like a JSON object or array are stored as the parsed
/// structure; anything else is kept as given.
pub fn coerce_incoming_value(value: Value) -> Value {
    let parsed = match &value {
        Value::String(text) if looks_structured(text) => serde_json::from_str::<Value>(text).ok(),
        _ => None,
    };
    parsed.unwrap_or(value)
}

fn looks_structured(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Writes `value` at `path` below `root`, creating missing containers and
/// converting containers of the wrong kind. On error the tree may already be
/// partially vivified, so callers that need atomic writes work on a copy.
pub fn set_path(
    root: &mut Value,
    path: &[PathSegment],
    value: Value,
) -> Result<Vec<ShapeConversion>, VarCommandError> {
    let value = coerce_incoming_value(value);
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(Vec::new());
    };

    let mut conversions = Vec::new();
    let mut walked = Vec::with_capacity(path.len());
    let mut current = root;
    for segment in parents {
        prepare_container(current, segment, &walked, &mut conversions)?;
        current = child_slot(current, segment, &walked)?;
        walked.push(segment.to_string());
    }

    prepare_container(current, last, &walked, &mut conversions)?;
    *child_slot(current, last, &walked)? = value;
    Ok(conversions)
}

enum Reshape {
    Vivify,
    ObjectToArray,
    ArrayToObject,
}

/// Makes `container` the kind `segment` needs. Empty containers are simply
/// replaced; populated ones are converted and the conversion is recorded.
fn prepare_container(
    container: &mut Value,
    segment: &PathSegment,
    walked: &[String],
    conversions: &mut Vec<ShapeConversion>,
) -> Result<(), VarCommandError> {
    let reshape = match (&*container, segment) {
        (Value::Null, _) => Reshape::Vivify,
        (Value::Object(map), PathSegment::Index(_)) if map.is_empty() => Reshape::Vivify,
        (Value::Array(items), PathSegment::Key(_)) if items.is_empty() => Reshape::Vivify,
        (Value::Object(_), PathSegment::Index(_)) => Reshape::ObjectToArray,
        (Value::Array(_), PathSegment::Key(_)) => Reshape::ArrayToObject,
        (Value::Object(_), _) | (Value::Array(_), PathSegment::Index(_)) => return Ok(()),
        (scalar, segment) => return Err(not_container(scalar, segment, walked)),
    };

    let label = walked.join(".");
    *container = match (reshape, std::mem::take(container)) {
        (Reshape::Vivify, _) if segment.is_index() => Value::Array(Vec::new()),
        (Reshape::Vivify, _) => Value::Object(Map::new()),
        (Reshape::ObjectToArray, Value::Object(map)) => {
            let (items, dropped_keys) = object_into_array(map);
            conversions.push(ShapeConversion::ObjectToArray {
                path: label,
                dropped_keys,
            });
            Value::Array(items)
        }
        (Reshape::ArrayToObject, Value::Array(items)) => {
            conversions.push(ShapeConversion::ArrayToObject { path: label });
            Value::Object(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), item))
                    .collect(),
            )
        }
        (_, unchanged) => unchanged,
    };
    Ok(())
}

/// Index keys keep their slots; every other key is dropped and returned.
fn object_into_array(map: Map<String, Value>) -> (Vec<Value>, Vec<String>) {
    let mut items = Vec::new();
    let mut dropped = Vec::new();
    for (key, value) in map {
        match PathSegment::parse(&key) {
            PathSegment::Index(index) if index <= MAX_ARRAY_INDEX => {
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                items[index] = value;
            }
            _ => dropped.push(key),
        }
    }
    (items, dropped)
}

fn child_slot<'a>(
    container: &'a mut Value,
    segment: &PathSegment,
    walked: &[String],
) -> Result<&'a mut Value, VarCommandError> {
    match (container, segment) {
        (Value::Object(map), segment) => Ok(map.entry(segment.as_key()).or_insert(Value::Null)),
        (Value::Array(items), PathSegment::Index(index)) => {
            if *index > MAX_ARRAY_INDEX {
                return Err(VarCommandError::new(
                    "PATH_INDEX_LIMIT",
                    format!(
                        "index {} exceeds the maximum array index {}",
                        index, MAX_ARRAY_INDEX
                    ),
                ));
            }
            if items.len() <= *index {
                items.resize(*index + 1, Value::Null);
            }
            Ok(&mut items[*index])
        }
        (other, segment) => Err(not_container(other, segment, walked)),
    }
}

fn not_container(found: &Value, segment: &PathSegment, walked: &[String]) -> VarCommandError {
    let expected = if segment.is_index() {
        "an array"
    } else {
        "an object"
    };
    let location = if walked.is_empty() {
        "<root>".to_string()
    } else {
        walked.join(".")
    };
    VarCommandError::new(
        "PATH_NOT_CONTAINER",
        format!(
            "target container is not {} ({} found at {})",
            expected,
            VarType::of(found),
            location
        ),
    )
}
