//! Errors from the KV store adapter.

use thiserror::Error;

/// Errors surfaced by [`crate::adapter::KvStore`] and the session/election
/// primitives built on top of it.
#[derive(Debug, Error)]
pub enum Error {
    /// The underlying etcd client returned an error.
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    /// A watch stream ended or errored; the caller should reconnect.
    #[error("watch stream closed: {0}")]
    WatchClosed(String),

    /// The session's lease was lost (expired or explicitly revoked).
    #[error("session lost")]
    SessionLost,

    /// Failed to construct a KV client at startup — fatal per `spec.md` §7.
    #[error("failed to construct KV client: {0}")]
    Connect(#[source] etcd_client::Error),
}

/// Convenience alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
