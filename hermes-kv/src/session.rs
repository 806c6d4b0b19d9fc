//! Lease-backed sessions (`spec.md` §4.2, §4.8).
//!
//! A session owns a background keepalive task. Once the task observes the
//! lease keepalive stream end (the lease expired, was revoked, or the
//! connection to etcd failed beyond recovery), it marks the session's
//! `done` signal and exits — callers await [`EtcdSession::done`] the same
//! way the spec's supervisor awaits its "session done" signal to detect
//! lost leadership.

use crate::error::{Error, Result};
use async_trait::async_trait;
use etcd_client::Client;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// A lease-backed session, as returned by [`crate::EtcdKv::new_session`].
pub struct EtcdSession {
    lease_id: i64,
    done: Arc<Notify>,
    fired: std::sync::atomic::AtomicBool,
}

impl EtcdSession {
    pub(crate) async fn grant(mut client: Client, ttl_secs: u64) -> Result<EtcdSession> {
        let resp = client.lease_grant(ttl_secs as i64, None).await.map_err(Error::from)?;
        let lease_id = resp.id();

        let (mut keeper, mut stream) = client.lease_keep_alive(lease_id).await.map_err(Error::from)?;
        let done = Arc::new(Notify::new());
        let task_done = done.clone();

        tokio::spawn(async move {
            let keepalive_interval = std::time::Duration::from_secs((ttl_secs / 3).max(1));
            loop {
                if let Err(err) = keeper.keep_alive().await {
                    warn!(error = %err, lease_id, "lease keepalive send failed");
                    break;
                }
                match tokio::time::timeout(keepalive_interval * 2, stream.message()).await {
                    Ok(Ok(Some(resp))) if resp.ttl() > 0 => {
                        tokio::time::sleep(keepalive_interval).await;
                    }
                    Ok(Ok(Some(_))) => {
                        warn!(lease_id, "lease keepalive reported ttl<=0, lease expired");
                        break;
                    }
                    Ok(Ok(None)) => {
                        warn!(lease_id, "lease keepalive stream closed");
                        break;
                    }
                    Ok(Err(err)) => {
                        warn!(error = %err, lease_id, "lease keepalive stream errored");
                        break;
                    }
                    Err(_) => {
                        warn!(lease_id, "lease keepalive response timed out");
                        break;
                    }
                }
            }
            task_done.notify_waiters();
        });

        Ok(EtcdSession {
            lease_id,
            done,
            fired: std::sync::atomic::AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl super::adapter::Session for EtcdSession {
    fn lease_id(&self) -> i64 {
        self.lease_id
    }

    async fn done(&self) {
        use std::sync::atomic::Ordering;
        if self.fired.load(Ordering::SeqCst) {
            return;
        }
        self.done.notified().await;
        self.fired.store(true, Ordering::SeqCst);
    }
}
