//! Error types shared across the core data model: decode and canonicalization
//! failures. Transport-specific errors live in `hermes-client`/`hermes-kv`.

use thiserror::Error;

/// Errors that can arise while decoding or canonicalizing opaque payloads.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A desired-snapshot object had no (or an empty) `name` field.
    #[error("object has no name field")]
    MissingName,

    /// The event referenced a kind this controller does not know about.
    #[error("unknown kind: {0}")]
    UnknownKind(String),
}
