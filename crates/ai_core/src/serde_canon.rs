//! Canonical JSON serialization for content hashing
//!
//! Object keys are sorted recursively and the output carries no whitespace,
//! so two structurally equal values always hash to the same digest.

use crate::errors::Result;
use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize a value to canonical JSON (sorted keys, no whitespace)
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    let canonical = canonicalize_value(serde_json::to_value(value)?);
    Ok(serde_json::to_string(&canonical)?)
}

fn canonicalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize_value(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize_value).collect()),
        other => other,
    }
}

/// Blake3 digest of the canonical JSON form, hex encoded
pub fn hash_canonical_hex<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    Ok(hash_bytes_hex(json.as_bytes()))
}

/// Blake3 digest of raw bytes, hex encoded
pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    hex::encode(blake3::hash(bytes).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Sample {
        zeta: i64,
        alpha: Vec<f64>,
        mid: String,
    }

    #[test]
    fn test_keys_sorted_without_whitespace() {
        let json = to_canonical_json(&Sample {
            zeta: 2,
            alpha: vec![0.5],
            mid: "m".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"alpha":[0.5],"mid":"m","zeta":2}"#);
    }

    #[test]
    fn test_hash_matches_raw_digest() {
        let value = serde_json::json!({"b": 1, "a": 2});
        let hash = hash_canonical_hex(&value).unwrap();
        assert_eq!(hash, hash_bytes_hex(br#"{"a":2,"b":1}"#));
        assert_eq!(hash.len(), 64);
    }
}
