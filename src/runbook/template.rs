//! Template rendering for step arguments.
//!
//! Strings may contain `{{ expr }}` placeholders. `inputs.<key>` expands to
//! the caller-supplied input (missing keys expand to nothing); every other
//! expression is reserved and expands to nothing. Rendering never fails.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use super::runtime::TraceEntry;

/// Caller-supplied inputs for a run.
pub type Inputs = BTreeMap<String, Value>;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("placeholder pattern is valid"));

/// Render every string inside `value`, preserving structure.
///
/// Sequences are rendered element-wise and mappings value-wise (keys are
/// never templated). Non-string scalars pass through unchanged.
pub fn render(value: &Value, inputs: &Inputs, prior: &[TraceEntry]) -> Value {
    match value {
        Value::String(s) => Value::String(render_str(s, inputs, prior)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| render(item, inputs, prior)).collect())
        }
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), render(v, inputs, prior))).collect(),
        ),
        other => other.clone(),
    }
}

/// Render placeholders in a single string.
pub fn render_str(template: &str, inputs: &Inputs, _prior: &[TraceEntry]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let expr = caps[1].trim();
            match expr.strip_prefix("inputs.") {
                Some(key) => inputs.get(key).map(display_value).unwrap_or_default(),
                None => {
                    tracing::debug!(expression = expr, "Unknown template expression");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// String form of an input value as substituted into templates.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
