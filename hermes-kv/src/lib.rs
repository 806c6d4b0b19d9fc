//! The KV store adapter for the hermes controller.
//!
//! [`adapter`] defines the backend-agnostic [`KvStore`]/[`Session`]/
//! [`Election`] traits; [`etcd_store`] implements them against a real etcd
//! cluster. `hermes-runtime` depends only on the traits, so it can run its
//! tests against [`testing::FakeKv`] (behind the `test-util` feature)
//! instead of a live cluster.

pub mod adapter;
pub mod election;
pub mod error;
pub mod etcd_store;
pub mod session;

#[cfg(feature = "test-util")]
pub mod testing;

pub use adapter::{Election, KvEvent, KvPair, KvStore, Session, WatchBatch, WatchStream};
pub use error::{Error, Result};
pub use etcd_store::{EtcdKv, EtcdKvConfig};
