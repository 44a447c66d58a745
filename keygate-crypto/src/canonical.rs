//! Deterministic, key-sorted JSON serialization.
//!
//! Authority signatures are computed over this exact byte form, so it must
//! match the server's canonicalization:
//! - object keys at every nesting level sorted by byte (ordinal) comparison
//! - arrays keep element order, each element itself canonicalized
//! - compact separators, no extraneous whitespace
//! - literal forward slashes are never escaped
//!
//! Date-like strings pass through as opaque strings; nothing here parses or
//! reformats them, otherwise the canonical form would diverge from the
//! signed form. Canonicalizing an already-canonical document reproduces it
//! unchanged.

use crate::error::CryptoResult;
use serde_json::Value;

/// Canonicalizes a JSON value into its deterministic string form.
#[must_use]
pub fn canonicalize(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Parses a JSON document and canonicalizes it.
///
/// # Errors
///
/// Returns an error if `input` is not valid JSON.
pub fn canonicalize_str(input: &str) -> CryptoResult<String> {
    let value: Value = serde_json::from_str(input)?;
    Ok(canonicalize(&value))
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, &Value::String((*key).clone()));
                out.push(':');
                write_value(out, &map[*key]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        // Scalars reuse serde_json's compact formatting. serde_json does
        // not escape forward slashes, which the authority relies on.
        scalar => out.push_str(&scalar.to_string()),
    }
}
