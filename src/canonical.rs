// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Canonical JSON and Digests
//!
//! Deterministic serialization of JSON values, used as the pre-image for
//! every digest and signature in the gateway. Two semantically equal values
//! must always produce identical bytes, across processes and across
//! implementations in other languages, or the cryptographic binding between
//! receipts and payloads falls apart.
//!
//! ## Canonical form
//!
//! - Object keys are emitted in ascending Unicode code-point order.
//! - Array element order is preserved.
//! - No whitespace.
//! - Strings, numbers, booleans and null render in RFC 8785 (JCS) notation,
//!   so numbers come out the way `JSON.stringify` prints them (no trailing
//!   zeros, shortest round-trip form).
//!
//! Key ordering is code-point order (UTF-8 byte order), which is why objects
//! are walked by this module instead of handing the whole value to
//! `serde_jcs` (JCS sorts by UTF-16 code units, which differs for keys
//! outside the Basic Multilingual Plane).

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Canonicalization failure.
///
/// Only reachable for values that JSON itself cannot represent (e.g. a
/// non-finite float smuggled in through `serde_json::Number`).
#[derive(Debug, Error)]
pub enum CanonicalizeError {
    #[error("canonical serialization failed: {message}")]
    Serialize { message: String },
}

/// Serialize a JSON value to its canonical byte form.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, CanonicalizeError> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out)?;
    Ok(out)
}

/// SHA-256 of arbitrary bytes, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of the canonical form of a JSON value, lowercase hex.
pub fn digest_value(value: &Value) -> Result<String, CanonicalizeError> {
    Ok(sha256_hex(&canonical_bytes(value)?))
}

/// Digest of an envelope's `intent` block.
pub fn intent_hash(intent: &Value) -> Result<String, CanonicalizeError> {
    digest_value(intent)
}

/// Digest of an envelope's `execute` block. This is the value a receipt is
/// bound to and the value executors recompute over the body they receive.
pub fn execute_hash(execute: &Value) -> Result<String, CanonicalizeError> {
    digest_value(execute)
}

/// Digest of an envelope's `acceptance` block. The gateway itself never
/// consumes this; it exists for parity checks in tests and tooling.
pub fn acceptance_hash(acceptance: &Value) -> Result<String, CanonicalizeError> {
    digest_value(acceptance)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), CanonicalizeError> {
    match value {
        Value::Object(map) => {
            out.push(b'{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            for (position, key) in keys.iter().enumerate() {
                if position > 0 {
                    out.push(b',');
                }
                write_jcs(key, out)?;
                out.push(b':');
                write_value(&map[key.as_str()], out)?;
            }
            out.push(b'}');
            Ok(())
        }
        Value::Array(items) => {
            out.push(b'[');
            for (position, item) in items.iter().enumerate() {
                if position > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
            Ok(())
        }
        scalar => write_jcs(scalar, out),
    }
}

/// Render a leaf (string, number, boolean, null, or a bare key) in JCS
/// notation.
fn write_jcs<T: serde::Serialize>(value: &T, out: &mut Vec<u8>) -> Result<(), CanonicalizeError> {
    let rendered = serde_jcs::to_string(value).map_err(|e| CanonicalizeError::Serialize {
        message: e.to_string(),
    })?;
    out.extend_from_slice(rendered.as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn canonical_str(value: &Value) -> String {
        String::from_utf8(canonical_bytes(value).expect("canonicalize")).expect("utf8")
    }

    #[test]
    fn object_keys_are_sorted() {
        let value = json!({"b": 1, "a": 2, "c": 3});
        assert_eq!(canonical_str(&value), r#"{"a":2,"b":1,"c":3}"#);
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let value = json!({
            "z": {"beta": 2, "alpha": 1},
            "a": [{"y": 0, "x": 0}]
        });
        assert_eq!(
            canonical_str(&value),
            r#"{"a":[{"x":0,"y":0}],"z":{"alpha":1,"beta":2}}"#
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let value = json!([3, 1, 2, true, null, "x"]);
        assert_eq!(canonical_str(&value), r#"[3,1,2,true,null,"x"]"#);
    }

    #[test]
    fn no_whitespace_is_emitted() {
        let value = json!({"a": [1, 2], "b": {"c": "d e"}});
        assert_eq!(canonical_str(&value), r#"{"a":[1,2],"b":{"c":"d e"}}"#);
    }

    #[test]
    fn whole_floats_render_as_integers() {
        // JCS number notation matches JSON.stringify: 100.0 prints as 100.
        assert_eq!(canonical_str(&json!(100.0)), "100");
        assert_eq!(canonical_str(&json!(0.5)), "0.5");
    }

    #[test]
    fn key_order_does_not_affect_digest() {
        let a: Value =
            serde_json::from_str(r#"{"action":"payments:refund","amount":100,"meta":{"k":1,"j":2}}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"meta":{"j":2,"k":1},"amount":100,"action":"payments:refund"}"#)
                .unwrap();
        assert_eq!(execute_hash(&a).unwrap(), execute_hash(&b).unwrap());
    }

    #[test]
    fn different_values_produce_different_digests() {
        let a = json!({"action": "payments:refund", "amount": 100});
        let b = json!({"action": "payments:refund", "amount": 10000});
        assert_ne!(execute_hash(&a).unwrap(), execute_hash(&b).unwrap());
    }

    #[test]
    fn the_three_envelope_digests_agree_on_equal_input() {
        // Same canonical algorithm regardless of which envelope block it is.
        let value = json!({"signature": "sig", "issuedAt": "2025-01-01T00:00:00Z"});
        let digest = digest_value(&value).unwrap();
        assert_eq!(intent_hash(&value).unwrap(), digest);
        assert_eq!(execute_hash(&value).unwrap(), digest);
        assert_eq!(acceptance_hash(&value).unwrap(), digest);
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let digest = digest_value(&json!({"a": 1})).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(digest, digest.to_lowercase());
    }

    #[test]
    fn unicode_keys_sort_by_code_point() {
        // "é" (U+00E9) sorts after every ASCII key.
        let value = json!({"é": 1, "z": 2, "a": 3});
        assert_eq!(canonical_str(&value), "{\"a\":3,\"z\":2,\"\u{e9}\":1}");
    }
}
