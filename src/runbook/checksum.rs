//! Runbook checksum computation.
//!
//! A runbook's checksum is self-referential: it is the SHA-256 of the
//! document's canonical JSON form with `metadata.checksum` blanked. The
//! canonical form sorts keys at every level, uses `,`/`:` separators with no
//! whitespace, and escapes non-ASCII characters as `\uXXXX` so digests agree
//! with other tooling producing the same form.

use std::fmt::Write as _;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Algorithm prefix carried by every checksum string.
pub const CHECKSUM_PREFIX: &str = "sha256:";

/// Compute the checksum of a runbook document.
///
/// The stated checksum (if any) is ignored.
pub fn compute_checksum(document: &Value) -> String {
    let blanked = blank_checksum(document);
    let canonical = canonical_json(&blanked);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{CHECKSUM_PREFIX}{:x}", hasher.finalize())
}

/// Return a copy of `document` with `metadata.checksum` set to `""`.
///
/// A missing or non-object `metadata` is replaced by `{"checksum": ""}`.
pub fn blank_checksum(document: &Value) -> Value {
    let mut copy = document.clone();
    if let Value::Object(root) = &mut copy {
        let metadata = root.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(meta) = metadata {
            meta.insert("checksum".to_string(), Value::String(String::new()));
        }
    }
    copy
}

/// Serialize a value in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sorted explicitly so the form does not depend on map ordering features.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04x}");
                }
            }
        }
    }
    out.push('"');
}
