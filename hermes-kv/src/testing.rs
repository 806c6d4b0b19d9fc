//! An in-memory [`KvStore`] fake, for tests that exercise `hermes-runtime`
//! without a live etcd cluster. Gated behind the `test-util` feature.

use crate::adapter::{Election, KvEvent, KvPair, KvStore, Session, WatchBatch, WatchStream};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Shared in-process state backing every clone of a [`FakeKv`].
struct Inner {
    data: Mutex<BTreeMap<String, Vec<u8>>>,
    events: broadcast::Sender<KvEvent>,
    next_lease: AtomicI64,
}

/// An in-memory [`KvStore`], useful for deterministic unit and integration
/// tests. All clones of a `FakeKv` share the same backing map, so tests can
/// create one store and hand clones to multiple simulated controller
/// instances.
#[derive(Clone)]
pub struct FakeKv {
    inner: Arc<Inner>,
}

impl Default for FakeKv {
    fn default() -> FakeKv {
        let (events, _rx) = broadcast::channel(1024);
        FakeKv {
            inner: Arc::new(Inner {
                data: Mutex::new(BTreeMap::new()),
                events,
                next_lease: AtomicI64::new(1),
            }),
        }
    }
}

impl FakeKv {
    pub fn new() -> FakeKv {
        FakeKv::default()
    }

    /// Like [`KvStore::new_session`], but returns the concrete [`FakeSession`]
    /// so tests can call [`FakeSession::expire`] directly.
    pub fn new_fake_session(&self, ttl: Duration) -> FakeSession {
        let lease_id = self.inner.next_lease.fetch_add(1, Ordering::SeqCst);
        FakeSession::new(lease_id, ttl)
    }
}

#[async_trait]
impl KvStore for FakeKv {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.inner.data.lock().insert(key.to_string(), value.clone());
        let _ = self.inner.events.send(KvEvent::Put(KvPair {
            key: key.to_string(),
            value,
        }));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.data.lock().remove(key);
        let _ = self.inner.events.send(KvEvent::Delete { key: key.to_string() });
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvPair>> {
        Ok(self
            .inner
            .data
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| KvPair {
                key: k.clone(),
                value: v.clone(),
            })
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream> {
        let prefix = prefix.to_string();
        let rx = self.inner.events.subscribe();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |item| {
            let prefix = prefix.clone();
            async move {
                match item {
                    Ok(event) => {
                        let matches = match &event {
                            KvEvent::Put(pair) => pair.key.starts_with(&prefix),
                            KvEvent::Delete { key } => key.starts_with(&prefix),
                        };
                        matches.then(|| Ok(WatchBatch { events: vec![event] }))
                    }
                    Err(_lagged) => Some(Err(Error::WatchClosed("fake watch stream lagged".into()))),
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn new_session(&self, ttl: Duration) -> Result<Box<dyn Session>> {
        Ok(Box::new(self.new_fake_session(ttl)))
    }

    fn new_election(&self, session: &dyn Session, prefix: &str) -> Box<dyn Election> {
        Box::new(FakeElection::new(self.clone(), session.lease_id(), prefix))
    }
}

/// A fake [`Session`] that never expires on its own; call
/// [`FakeSession::expire`] to simulate lease loss in tests.
pub struct FakeSession {
    lease_id: i64,
    done: Arc<tokio::sync::Notify>,
    expired: Arc<std::sync::atomic::AtomicBool>,
    _ttl: Duration,
}

impl FakeSession {
    fn new(lease_id: i64, ttl: Duration) -> FakeSession {
        FakeSession {
            lease_id,
            done: Arc::new(tokio::sync::Notify::new()),
            expired: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            _ttl: ttl,
        }
    }

    /// Simulates lease expiry: [`Session::done`] resolves immediately after.
    pub fn expire(&self) {
        self.expired.store(true, Ordering::SeqCst);
        self.done.notify_waiters();
    }
}

#[async_trait]
impl Session for FakeSession {
    fn lease_id(&self) -> i64 {
        self.lease_id
    }

    async fn done(&self) {
        if self.expired.load(Ordering::SeqCst) {
            return;
        }
        self.done.notified().await;
    }
}

/// A fake election, implemented as a spinlock over an atomic "current
/// campaign owner" sequence number shared by every election on the same
/// prefix created from the same [`FakeKv`].
struct FakeElection {
    kv: FakeKv,
    lease_id: i64,
    key: String,
    sequence: Arc<AtomicU64>,
}

impl FakeElection {
    fn new(kv: FakeKv, lease_id: i64, prefix: &str) -> FakeElection {
        FakeElection {
            kv,
            lease_id,
            key: format!("{prefix}/campaign"),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl Election for FakeElection {
    async fn campaign(&self, value: &str) -> Result<()> {
        loop {
            let holder = self.kv.inner.data.lock().get(&self.key).cloned();
            if holder.is_none() {
                self.kv.put(&self.key, value.as_bytes().to_vec()).await?;
                let observed = self.kv.inner.data.lock().get(&self.key).cloned();
                if observed.as_deref() == Some(value.as_bytes()) {
                    return Ok(());
                }
                continue;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn resign(&self) -> Result<()> {
        let holder = self.kv.inner.data.lock().get(&self.key).cloned();
        if holder.is_some() {
            self.kv.delete(&self.key).await?;
        }
        let _ = self.lease_id;
        let _ = self.sequence.load(Ordering::SeqCst);
        Ok(())
    }

    fn observe(&self) -> BoxStream<'static, Result<String>> {
        let rx = self.kv.inner.events.subscribe();
        let key = self.key.clone();
        let stream = tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |item| {
            let key = key.clone();
            async move {
                match item {
                    Ok(KvEvent::Put(pair)) if pair.key == key => {
                        Some(Ok(String::from_utf8_lossy(&pair.value).into_owned()))
                    }
                    Ok(_) => None,
                    Err(_lagged) => Some(Err(Error::WatchClosed("fake observe stream lagged".into()))),
                }
            }
        });
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let kv = FakeKv::new();
        kv.put("/hermes/domain/a", b"1".to_vec()).await.unwrap();
        kv.put("/hermes/domain/b", b"2".to_vec()).await.unwrap();
        kv.put("/hermes/cluster/a", b"3".to_vec()).await.unwrap();

        let domains = kv.get_prefix("/hermes/domain/").await.unwrap();
        assert_eq!(domains.len(), 2);

        kv.delete("/hermes/domain/a").await.unwrap();
        let domains = kv.get_prefix("/hermes/domain/").await.unwrap();
        assert_eq!(domains.len(), 1);
        assert_eq!(domains[0].key, "/hermes/domain/b");
    }

    #[tokio::test]
    async fn watch_prefix_only_sees_matching_keys() {
        let kv = FakeKv::new();
        let mut stream = kv.watch_prefix("/hermes/domain/").await.unwrap();

        kv.put("/hermes/cluster/x", b"no".to_vec()).await.unwrap();
        kv.put("/hermes/domain/x", b"yes".to_vec()).await.unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.events.len(), 1);
        match &batch.events[0] {
            KvEvent::Put(pair) => assert_eq!(pair.key, "/hermes/domain/x"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn session_done_resolves_after_expire() {
        let kv = FakeKv::new();
        let session = kv.new_fake_session(Duration::from_secs(5));
        session.expire();
        tokio::time::timeout(Duration::from_secs(1), session.done())
            .await
            .expect("done() should resolve promptly after expire()");
    }

    #[tokio::test]
    async fn only_one_candidate_holds_the_election_at_a_time() {
        let kv = FakeKv::new();
        let session_a = kv.new_session(Duration::from_secs(5)).await.unwrap();
        let session_b = kv.new_session(Duration::from_secs(5)).await.unwrap();
        let election_a = kv.new_election(session_a.as_ref(), "/hermes/election");
        let election_b = kv.new_election(session_b.as_ref(), "/hermes/election");

        election_a.campaign("a").await.unwrap();

        let b = tokio::time::timeout(Duration::from_millis(100), election_b.campaign("b")).await;
        assert!(b.is_err(), "second campaign should block while the first holds the key");

        election_a.resign().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), election_b.campaign("b"))
            .await
            .expect("second campaign should succeed once the first resigns")
            .unwrap();
    }
}
