//! Uniform action arguments.
//!
//! Steps may write their arguments either as a mapping or as a flat token
//! list. Both shapes are normalized once, after rendering, into
//! [`ActionArgs`] so handlers only ever see a string-keyed map.
//!
//! Token lists are read as key/value pairs:
//! - keys lose any leading `--` and map `-` to `_` (`--target-dir` → `target_dir`)
//! - `--key=value` in key position is an inline pair
//! - `k=v` in key position (after at least one key) continues the previous
//!   key, turning its value into a list
//! - a trailing key with no value maps to `""`
//!
//! The original token list is kept alongside the map for actions that
//! forward their arguments verbatim, such as the CLI wrappers.

use serde_json::{Map, Value};

/// Normalized, string-keyed action arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    values: Map<String, Value>,
    tokens: Vec<Value>,
}

impl ActionArgs {
    /// Create empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a rendered argument value.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from(map),
            Value::Array(tokens) => Self::from_tokens(tokens),
            Value::Null => Self::new(),
            other => {
                tracing::debug!(args = %other, "Ignoring scalar step arguments");
                Self::new()
            }
        }
    }

    fn from_tokens(raw_tokens: Vec<Value>) -> Self {
        let mut values = Map::new();
        let mut last_key: Option<String> = None;
        let mut tokens = raw_tokens.clone().into_iter();

        while let Some(token) = tokens.next() {
            let raw = match &token {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };

            if let Some(flag) = raw.strip_prefix("--") {
                if let Some((key, value)) = flag.split_once('=') {
                    let key = normalize_key(key);
                    values.insert(key.clone(), Value::String(value.to_string()));
                    last_key = Some(key);
                    continue;
                }
            } else if let Some(key) = last_key.as_deref().filter(|_| raw.contains('=')) {
                append(&mut values, key, token);
                continue;
            }

            let key = normalize_key(&raw);
            let value = tokens.next().unwrap_or_else(|| Value::String(String::new()));
            values.insert(key.clone(), value);
            last_key = Some(key);
        }

        Self { values, tokens: raw_tokens }
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a raw value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Get a value as a string; scalars are stringified, `null` is absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Get a required, non-empty string value.
    pub fn require_str(&self, key: &str) -> anyhow::Result<String> {
        self.get_str(key)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument '{key}'"))
    }

    /// Get a value as a boolean (`true`, `"true"`, `"1"`, `"yes"`).
    pub fn get_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
            _ => false,
        }
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The token list as written, empty for mapping arguments.
    pub fn tokens(&self) -> &[Value] {
        &self.tokens
    }

    /// The underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Convert into a JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.values)
    }
}

impl From<Map<String, Value>> for ActionArgs {
    fn from(values: Map<String, Value>) -> Self {
        Self { values, tokens: Vec::new() }
    }
}

fn normalize_key(raw: &str) -> String {
    raw.trim_start_matches("--").replace('-', "_")
}

fn append(values: &mut Map<String, Value>, key: &str, token: Value) {
    let slot = values.entry(key.to_string()).or_insert(Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => items.push(token),
        existing => {
            let first = existing.take();
            *existing = Value::Array(vec![first, token]);
        }
    }
}
