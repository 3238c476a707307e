//! Canonical JSON.
//!
//! Object keys are sorted recursively by byte order, arrays keep their order,
//! output is compact. Two structurally equal payloads always serialize to the
//! same bytes regardless of how they were built or stored.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CryptoError;

/// Serialize `value` to canonical JSON bytes.
pub fn canonical_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&canonicalize(value))?)
}

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        },
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use keyway_proto::{AclPayload, UserEntry};
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_canonical_form() {
        let payload = AclPayload {
            lock_id: 7,
            version: 2,
            users: vec![UserEntry { kid: "a".into(), public_key: "AQ==".into() }],
        };
        let bytes = canonical_serialize(&payload).unwrap();
        insta::assert_snapshot!(
            String::from_utf8(bytes).unwrap(),
            @r#"{"lockId":7,"users":[{"kid":"a","pub":"AQ=="}],"version":2}"#
        );
    }

    #[test]
    fn key_order_does_not_matter() {
        let a = json!({"z": 1, "a": {"y": [3, 1], "b": null}});
        let b: Value = serde_json::from_str(r#"{"a":{"b":null,"y":[3,1]},"z":1}"#).unwrap();
        assert_eq!(canonical_serialize(&a).unwrap(), canonical_serialize(&b).unwrap());
        assert_eq!(
            canonical_serialize(&a).unwrap(),
            br#"{"a":{"b":null,"y":[3,1]},"z":1}"#.to_vec()
        );
    }

    #[test]
    fn arrays_keep_order() {
        let v = json!([{"b": 1, "a": 2}, 0]);
        assert_eq!(canonical_serialize(&v).unwrap(), br#"[{"a":2,"b":1},0]"#.to_vec());
    }
}
