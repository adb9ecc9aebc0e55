//! Hashing utilities for cache keys

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value deterministically
///
/// Object keys are emitted in sorted order and no whitespace is produced, so
/// two values that differ only in key order yield the same string.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(s, out),
        Value::Array(arr) => {
            out.push('[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(obj) => {
            // Sort keys for consistent hashing
            let mut keys: Vec<_> = obj.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                if let Some(v) = obj.get(key) {
                    write_canonical(v, out);
                }
            }
            out.push('}');
        }
    }
}

fn write_string(s: &str, out: &mut String) {
    // Display on a JSON string value produces the quoted, escaped form
    out.push_str(&Value::from(s).to_string());
}

/// SHA-256 digest of `bytes` as lowercase hex
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{:x}", digest)
}

/// Fingerprint of a JSON value: SHA-256 over its canonical form
pub fn hash_json(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_hash_order_independent() {
        let obj1 = json!({"a": 1, "b": {"x": true, "y": null}});
        let obj2 = json!({"b": {"y": null, "x": true}, "a": 1});

        assert_eq!(canonical_json(&obj1), canonical_json(&obj2));
        assert_eq!(hash_json(&obj1), hash_json(&obj2));
    }

    #[test]
    fn test_json_hash_different_values() {
        let obj1 = json!({"a": 1});
        let obj2 = json!({"a": 2});

        assert_ne!(hash_json(&obj1), hash_json(&obj2));
    }

    #[test]
    fn test_canonical_form_is_compact_and_escaped() {
        let value = json!({"z": [1, "two", {"q": "a\"b"}], "a": false});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":false,"z":[1,"two",{"q":"a\"b"}]}"#
        );
    }

    #[test]
    fn test_sha256_hex_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
