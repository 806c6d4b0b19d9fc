//! The `etcd-client`-backed [`KvStore`] implementation (`spec.md` §4.2).

use crate::adapter::{Election, KvEvent, KvPair, KvStore, Session, WatchBatch, WatchStream};
use crate::election::EtcdElection;
use crate::error::{Error, Result};
use crate::session::EtcdSession;
use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, EventType, GetOptions, WatchOptions};
use futures::StreamExt;
use std::time::Duration;

/// Connection settings for [`EtcdKv::connect`].
#[derive(Debug, Clone)]
pub struct EtcdKvConfig {
    pub endpoints: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A [`KvStore`] backed by a real etcd cluster.
#[derive(Clone)]
pub struct EtcdKv {
    client: Client,
}

impl EtcdKv {
    /// Connects to the cluster described by `config`. Failure here is fatal
    /// startup error per `spec.md` §7 — the caller should not retry this
    /// itself, only the process supervisor should restart.
    pub async fn connect(config: &EtcdKvConfig) -> Result<EtcdKv> {
        let mut options = ConnectOptions::new();
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options = options.with_user(user, pass);
        }
        let client = Client::connect(&config.endpoints, Some(options))
            .await
            .map_err(Error::Connect)?;
        Ok(EtcdKv { client })
    }
}

#[async_trait]
impl KvStore for EtcdKv {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.client.clone().put(key, value, None).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client.clone().delete(key, None).await?;
        Ok(())
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<KvPair>> {
        let resp = self
            .client
            .clone()
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| KvPair {
                key: String::from_utf8_lossy(kv.key()).into_owned(),
                value: kv.value().to_vec(),
            })
            .collect())
    }

    async fn watch_prefix(&self, prefix: &str) -> Result<WatchStream> {
        let (_watcher, stream) = self
            .client
            .clone()
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await?;

        let batches = stream.map(|result| {
            let resp = result.map_err(Error::from)?;
            if resp.canceled() {
                return Err(Error::WatchClosed(
                    resp.cancel_reason().to_string(),
                ));
            }
            let events = resp
                .events()
                .iter()
                .filter_map(|event| {
                    let kv = event.kv()?;
                    let key = String::from_utf8_lossy(kv.key()).into_owned();
                    Some(match event.event_type() {
                        EventType::Put => KvEvent::Put(KvPair {
                            key,
                            value: kv.value().to_vec(),
                        }),
                        EventType::Delete => KvEvent::Delete { key },
                    })
                })
                .collect();
            Ok(WatchBatch { events })
        });

        // Keep the watcher alive for the lifetime of the stream by moving it
        // into the mapped stream's closure environment via a boxed wrapper.
        let kept_alive = WatchHandleStream {
            inner: batches,
            _watcher,
        };
        Ok(Box::pin(kept_alive))
    }

    async fn new_session(&self, ttl: Duration) -> Result<Box<dyn Session>> {
        let session = EtcdSession::grant(self.client.clone(), ttl.as_secs().max(1)).await?;
        Ok(Box::new(session))
    }

    fn new_election(&self, session: &dyn Session, prefix: &str) -> Box<dyn Election> {
        Box::new(EtcdElection::new(self.client.clone(), prefix, session.lease_id()))
    }
}

/// Wraps a mapped watch stream together with the [`etcd_client::Watcher`]
/// handle that must outlive it, or etcd cancels the watch server-side.
struct WatchHandleStream<S> {
    inner: S,
    _watcher: etcd_client::Watcher,
}

impl<S: futures::Stream + Unpin> futures::Stream for WatchHandleStream<S> {
    type Item = S::Item;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        let this = self.get_mut();
        std::pin::Pin::new(&mut this.inner).poll_next(cx)
    }
}
