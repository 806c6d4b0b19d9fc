//! Canonicalization of opaque JSON payloads.
//!
//! The control plane may re-emit semantically identical objects with
//! different whitespace or key ordering across reconciles. Comparing the
//! canonical form (rather than raw bytes) is what keeps the reconciler from
//! churning the KV store — and waking every downstream watcher — on every
//! pass.
//!
//! `serde_json::Map` is backed by a `BTreeMap` unless the crate's
//! `preserve_order` feature is enabled. This crate never enables that
//! feature: sorted keys are exactly what makes two differently-ordered but
//! equal objects canonicalize to the same bytes.

use crate::error::Error;

/// Parse `input` as JSON and re-serialize it in a stable form.
///
/// Returns the original error (wrapped) if `input` is not valid JSON.
pub fn canonicalize(input: &[u8]) -> Result<Vec<u8>, Error> {
    let value: serde_json::Value = serde_json::from_slice(input)?;
    serde_json::to_vec(&value).map_err(Error::from)
}

/// Convenience wrapper over [`canonicalize`] for `&str` input.
pub fn canonicalize_str(input: &str) -> Result<Vec<u8>, Error> {
    canonicalize(input.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorders_keys_and_strips_whitespace() {
        let a = canonicalize_str(r#"{"b": 1, "a": 2}"#).unwrap();
        let b = canonicalize_str(r#"{ "a" :  2 , "b" :1 }"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn is_idempotent() {
        let once = canonicalize_str(r#"{"hosts":["a.com"],"name":"d1"}"#).unwrap();
        let twice = canonicalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(canonicalize_str("not json").is_err());
    }

    proptest::proptest! {
        #[test]
        fn idempotent_over_arbitrary_objects(a in 0i64..1000, b in 0i64..1000, name in "[a-z]{1,8}") {
            let input = serde_json::json!({ "a": a, "b": b, "name": name });
            let raw = serde_json::to_vec(&input).unwrap();
            let once = canonicalize(&raw).unwrap();
            let twice = canonicalize(&once).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
