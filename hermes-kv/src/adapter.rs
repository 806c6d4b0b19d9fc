//! The KV client adapter surface (`spec.md` §4.2): a thin, backend-agnostic
//! abstraction over get-by-prefix / put / delete / watch / lease-session
//! against the KV store. `hermes-runtime` depends only on this trait, never
//! on `etcd-client` directly, so its tests can run against the in-memory
//! fake in [`crate::testing`] instead of a live cluster.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// A single key/value pair as observed in the KV store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPair {
    /// The full key.
    pub key: String,
    /// The raw value bytes.
    pub value: Vec<u8>,
}

/// A single mutation observed on a watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvEvent {
    /// A key was created or overwritten.
    Put(KvPair),
    /// A key was removed.
    Delete {
        /// The deleted key.
        key: String,
    },
}

/// One batch of events delivered by a watch stream. The KV store guarantees
/// events within a batch, and across batches on the same stream, preserve
/// the order they were applied in (`spec.md` §4.2, §5).
#[derive(Debug, Clone, Default)]
pub struct WatchBatch {
    /// Events in this batch, in order.
    pub events: Vec<KvEvent>,
}

/// A fallible, reconnectable stream of [`WatchBatch`]es. A terminal `Err` (or
/// stream end) means the caller must reopen the watch — the adapter itself
/// does not retry.
pub type WatchStream = BoxStream<'static, Result<WatchBatch>>;

/// A live session backed by a KV lease. Losing the lease (TTL expiry,
/// explicit revoke, or a connectivity failure the keepalive can't recover
/// from) resolves [`Session::done`] — this is the controller's "session
/// done" signal from `spec.md` §4.8.
#[async_trait]
pub trait Session: Send + Sync {
    /// The lease ID backing this session, for use with [`KvStore::new_election`].
    fn lease_id(&self) -> i64;

    /// Resolves once this session's lease is lost. Never resolves while the
    /// lease is healthy.
    async fn done(&self);
}

/// A campaign against an election prefix, backed by a [`Session`].
#[async_trait]
pub trait Election: Send + Sync {
    /// Campaign with `value` as the candidate's identity. Blocks until
    /// leadership is acquired (or the calling future is dropped/cancelled).
    async fn campaign(&self, value: &str) -> Result<()>;

    /// Best-effort resignation of leadership, if held.
    async fn resign(&self) -> Result<()>;

    /// A lazy, restartable stream of the current leader's campaign value.
    /// Used only by diagnostics; never by the election loop itself.
    fn observe(&self) -> BoxStream<'static, Result<String>>;
}

/// The KV client adapter: get-by-prefix / put / delete / watch / sessions.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `value` at `key`, last-write-wins.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete `key`. Deleting an absent key is a success (idempotent).
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every key/value pair under `prefix`.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvPair>>;

    /// Open a watch over every key under `prefix`.
    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream>;

    /// Create a new lease-backed session with the given TTL.
    async fn new_session(&self, ttl: Duration) -> Result<Box<dyn Session>>;

    /// Create a new election campaign handle on `prefix`, backed by `session`.
    fn new_election(&self, session: &dyn Session, prefix: &str) -> Box<dyn Election>;
}
