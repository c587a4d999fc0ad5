//! Canonical JSON encoding and commit-hash computation for round creation.
//!
//! Equivalent to
//! `hashlib.sha256(json.dumps(data, sort_keys=True).encode()).hexdigest()`:
//! object keys sorted lexicographically, no insignificant whitespace.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Serializes `value` with object keys sorted, recursively, matching
/// Python's `json.dumps(..., sort_keys=True)` byte-for-byte for the plain
/// JSON types (strings, numbers, bools, null, arrays, objects) used in
/// round commit data.
pub fn canonical_json(value: &Value) -> String {
    fn render(value: &Value, out: &mut String) {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, &Value> = map.iter().collect();
                out.push('{');
                for (i, (k, v)) in sorted.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).expect("string key serializes"));
                    out.push(':');
                    render(v, out);
                }
                out.push('}');
            }
            Value::Array(items) => {
                out.push('[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    render(v, out);
                }
                out.push(']');
            }
            other => out.push_str(&other.to_string()),
        }
    }

    let mut out = String::new();
    render(value, &mut out);
    out
}

/// SHA-256 hex digest of `canonical_json(value)`.
pub fn commit_hash(value: &Value) -> String {
    let encoded = canonical_json(value);
    let digest = Sha256::digest(encoded.as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let value = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json(&value), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn nested_objects_sorted_recursively() {
        let value = json!({"z": {"y": 1, "x": 2}, "a": 1});
        assert_eq!(canonical_json(&value), r#"{"a":1,"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn commit_hash_is_deterministic() {
        let value = json!({
            "code": "20260728",
            "start_ts": "2026-07-28T00:00:00+00:00",
            "fee_bps": 200,
            "seed": "abc123"
        });
        let h1 = commit_hash(&value);
        let h2 = commit_hash(&value);
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn commit_hash_changes_with_seed() {
        let a = json!({"code": "20260728", "start_ts": "t", "fee_bps": 200, "seed": "one"});
        let b = json!({"code": "20260728", "start_ts": "t", "fee_bps": 200, "seed": "two"});
        assert_ne!(commit_hash(&a), commit_hash(&b));
    }
}
