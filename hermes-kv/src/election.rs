//! Leader election campaigns (`spec.md` §4.8), backed by etcd's built-in
//! election API and a [`crate::session::EtcdSession`]'s lease.

use crate::error::{Error, Result};
use async_trait::async_trait;
use etcd_client::{Client, LeaderKey};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;

/// An election campaign against `prefix`, tied to a lease's lifetime.
pub struct EtcdElection {
    client: Client,
    prefix: String,
    lease_id: i64,
    leader_key: Arc<Mutex<Option<LeaderKey>>>,
}

impl EtcdElection {
    pub(crate) fn new(client: Client, prefix: &str, lease_id: i64) -> EtcdElection {
        EtcdElection {
            client,
            prefix: prefix.to_string(),
            lease_id,
            leader_key: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl super::adapter::Election for EtcdElection {
    async fn campaign(&self, value: &str) -> Result<()> {
        let resp = self
            .client
            .clone()
            .campaign(self.prefix.as_str(), value, self.lease_id)
            .await?;
        *self.leader_key.lock() = resp.leader().cloned();
        Ok(())
    }

    async fn resign(&self) -> Result<()> {
        let leader_key = self.leader_key.lock().take();
        if let Some(leader_key) = leader_key {
            self.client.clone().resign(Some(leader_key)).await?;
        }
        Ok(())
    }

    fn observe(&self) -> BoxStream<'static, Result<String>> {
        let client = self.client.clone();
        let prefix = self.prefix.clone();

        enum ObserveState {
            Connecting,
            Open(etcd_client::ElectionObserveStream),
            Done,
        }

        Box::pin(
            futures::stream::unfold(
                (client, prefix, ObserveState::Connecting),
                |(mut client, prefix, state)| async move {
                    let mut stream = match state {
                        ObserveState::Connecting => match client.observe(prefix.clone()).await {
                            Ok(stream) => stream,
                            Err(err) => return Some((Err(Error::from(err)), (client, prefix, ObserveState::Done))),
                        },
                        ObserveState::Open(stream) => stream,
                        ObserveState::Done => return None,
                    };

                    match stream.message().await {
                        Ok(Some(resp)) => {
                            let value = resp
                                .kv()
                                .map(|kv| String::from_utf8_lossy(kv.value()).into_owned())
                                .unwrap_or_default();
                            Some((Ok(value), (client, prefix, ObserveState::Open(stream))))
                        }
                        Ok(None) => Some((
                            Err(Error::WatchClosed("election observe stream ended".into())),
                            (client, prefix, ObserveState::Done),
                        )),
                        Err(err) => Some((Err(Error::from(err)), (client, prefix, ObserveState::Done))),
                    }
                },
            )
            .fuse(),
        )
    }
}
