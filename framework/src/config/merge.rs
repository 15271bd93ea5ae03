//! Layered merging of configuration trees and command-line flags
//!
//! Objects merge key by key; arrays and scalars from the higher layer
//! replace the lower one wholesale.

use crate::error::FrameworkError;
use serde_json::{Map, Value};

/// Merge `source` into `target`, `source` taking precedence
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}

/// Get `key` from `parent` as an object, replacing any non-object value
pub(crate) fn ensure_object<'a>(
    parent: &'a mut Map<String, Value>,
    key: &str,
) -> &'a mut Map<String, Value> {
    let entry = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// The root of a tree as an object, replacing any non-object root
pub(crate) fn root_object(tree: &mut Value) -> &mut Map<String, Value> {
    if !tree.is_object() {
        *tree = Value::Object(Map::new());
    }
    match tree {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// Convert the literal flag tokens into typed values
///
/// `"true"`, `"false"` and `"null"` become their JSON equivalents;
/// `"undefined"` yields `None` so the caller can drop the key. Arrays and
/// objects are coerced element by element.
pub fn coerce(value: Value) -> Option<Value> {
    match value {
        Value::String(s) => match s.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            "undefined" => None,
            _ => Some(Value::String(s)),
        },
        Value::Array(items) => Some(Value::Array(
            items
                .into_iter()
                .map(|item| coerce(item).unwrap_or(Value::Null))
                .collect(),
        )),
        Value::Object(map) => Some(Value::Object(
            map.into_iter()
                .filter_map(|(k, v)| coerce(v).map(|v| (k, v)))
                .collect(),
        )),
        other => Some(other),
    }
}

/// Already-parsed command-line flags
///
/// Keys are flat and may use dot notation (`log.level`); values are
/// strings or lists of strings, the CLI having split list values on `,`
/// or `|`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Flags {
    entries: Vec<(String, Value)>,
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flag (later flags win over earlier ones with the same key)
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Parse a `key=value` argument, splitting list values on `,` or `|`
    ///
    /// A bare `key` is shorthand for `key=true`.
    pub fn parse_arg(arg: &str) -> Result<(String, Value), FrameworkError> {
        let (key, raw) = match arg.split_once('=') {
            Some((key, raw)) => (key.trim(), raw),
            None => (arg.trim(), "true"),
        };
        if key.is_empty() {
            return Err(FrameworkError::config(format!("Invalid flag '{}'", arg)));
        }

        let value = if raw.contains(',') || raw.contains('|') {
            Value::Array(
                raw.split([',', '|'])
                    .map(|part| Value::String(part.trim().to_string()))
                    .collect(),
            )
        } else {
            Value::String(raw.to_string())
        };
        Ok((key.to_string(), value))
    }

    /// Build flags from a list of `key=value` arguments
    pub fn from_args<I, S>(args: I) -> Result<Self, FrameworkError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut flags = Self::new();
        for arg in args {
            let (key, value) = Self::parse_arg(arg.as_ref())?;
            flags.insert(key, value);
        }
        Ok(flags)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Expand dotted keys into a tree and coerce the literal tokens
    pub fn to_tree(&self) -> Value {
        let mut tree = Value::Object(Map::new());
        for (key, value) in &self.entries {
            let Some(value) = coerce(value.clone()) else {
                continue;
            };

            let mut segments: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
            let Some(leaf) = segments.pop() else {
                continue;
            };
            let mut node = root_object(&mut tree);
            for segment in segments {
                node = ensure_object(node, segment);
            }
            node.insert(leaf.to_string(), value);
        }
        tree
    }
}
