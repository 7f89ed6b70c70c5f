//! Canonical content hashing.
//!
//! Every record is hashed over a canonical JSON rendering: object keys are
//! sorted recursively, so two nodes that build the same record in a different
//! field order still derive the same digest. The digest is SHA-256,
//! hex-encoded (64 lowercase characters).
//!
//! The digest serves three purposes:
//! - the proof-of-work predicate ([`meets_difficulty`])
//! - chain linkage (`prevBlockHash`)
//! - deterministic tie-breaking when ordering records ([`sort_by_hash`])

use crate::error::{ChainError, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of a record.
pub type BlockHash = String;

/// Serialize a record to its canonical byte form.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = canonicalize(serde_json::to_value(value)?);
    Ok(serde_json::to_vec(&value)?)
}

/// Hash a record's canonical serialization.
pub fn hash<T: Serialize + ?Sized>(value: &T) -> Result<BlockHash> {
    let bytes = canonical_bytes(value)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, canonicalize(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Whether `hash` starts with `difficulty` hex zeros.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

/// Order records by their canonical hash.
///
/// Two records with the same hash cannot be ordered deterministically, so a
/// collision (including a record present twice) fails the whole sort.
pub fn sort_by_hash<T: Serialize>(items: Vec<T>) -> Result<Vec<T>> {
    let mut keyed = items
        .into_iter()
        .map(|item| Ok((hash(&item)?, item)))
        .collect::<Result<Vec<(BlockHash, T)>>>()?;

    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(ChainError::HashCollision(pair[0].0.clone()));
    }

    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Ab {
        a: u32,
        b: &'static str,
    }

    #[derive(Serialize)]
    struct Ba {
        b: &'static str,
        a: u32,
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let digest = hash(&"hello").unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_field_order() {
        let left = hash(&Ab { a: 1, b: "x" }).unwrap();
        let right = hash(&Ba { b: "x", a: 1 }).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_hash_detects_content_change() {
        let left = hash(&Ab { a: 1, b: "x" }).unwrap();
        let right = hash(&Ab { a: 2, b: "x" }).unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn test_canonical_bytes_sorts_nested_keys() {
        let value = serde_json::json!({ "z": { "y": 1, "x": 2 }, "a": [ { "d": 0, "c": 1 } ] });
        let bytes = canonical_bytes(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":[{"c":1,"d":0}],"z":{"x":2,"y":1}}"#
        );
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(!meets_difficulty("0ab0", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }

    #[test]
    fn test_sort_by_hash_is_input_order_independent() {
        let forward = sort_by_hash(vec!["a", "b", "c", "d"]).unwrap();
        let backward = sort_by_hash(vec!["d", "c", "b", "a"]).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_sort_by_hash_reports_collision() {
        let result = sort_by_hash(vec!["same", "other", "same"]);
        assert!(matches!(result, Err(ChainError::HashCollision(_))));
    }
}
