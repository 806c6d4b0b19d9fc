//! Leader-election supervisor (`spec.md` §4.8): campaigns via a KV-backed
//! session, runs the controller pipeline only while leader, and
//! re-campaigns on loss.

use futures::stream::BoxStream;
use futures::StreamExt;
use hermes_core::ElectionConfig;
use hermes_kv::KvStore;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const RECAMPAIGN_DELAY: Duration = Duration::from_secs(3);
const RESIGN_DEADLINE: Duration = Duration::from_secs(3);

/// Shared, lock-free leadership flag (`spec.md` §5, §9).
#[derive(Clone, Default)]
pub struct LeaderFlag(Arc<AtomicBool>);

impl LeaderFlag {
    pub fn new() -> LeaderFlag {
        LeaderFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn set(&self, value: bool) {
        self.0.store(value, Ordering::SeqCst);
    }

    pub fn shared(&self) -> Arc<AtomicBool> {
        self.0.clone()
    }
}

/// Runs the election state machine against `parent` until it is cancelled.
///
/// `on_leader` is invoked once per acquired leadership term with a child
/// token of `parent`; it should run the controller pipeline and return only
/// when that token is cancelled (or the pipeline itself fails). If
/// `cfg.enabled` is `false`, `on_leader` is invoked exactly once,
/// unconditionally, with a plain child of `parent`.
pub async fn run<F, Fut>(
    kv: Arc<dyn KvStore>,
    cfg: &ElectionConfig,
    identity: String,
    leader_flag: LeaderFlag,
    parent: CancellationToken,
    mut on_leader: F,
) where
    F: FnMut(CancellationToken) -> Fut,
    Fut: Future<Output = ()>,
{
    if !cfg.enabled {
        leader_flag.set(true);
        on_leader(parent.child_token()).await;
        leader_flag.set(false);
        return;
    }

    while !parent.is_cancelled() {
        let session = match kv.new_session(cfg.lease_ttl()).await {
            Ok(session) => Arc::from(session),
            Err(err) => {
                warn!(error = %err, "failed to create election session, retrying");
                if wait_or_exit(&parent, RECAMPAIGN_DELAY).await {
                    break;
                }
                continue;
            }
        };
        let election = kv.new_election(&*session, &cfg.prefix);

        info!(%identity, "campaigning for leadership");
        let campaign = tokio::select! {
            _ = parent.cancelled() => break,
            result = election.campaign(&identity) => result,
        };
        if let Err(err) = campaign {
            warn!(error = %err, "campaign failed, retrying");
            if wait_or_exit(&parent, RECAMPAIGN_DELAY).await {
                break;
            }
            continue;
        }

        info!(%identity, "acquired leadership");
        leader_flag.set(true);
        let child = parent.child_token();

        let watcher_child = child.clone();
        let watcher_session: Arc<dyn hermes_kv::Session> = session.clone();
        let watcher = tokio::spawn(async move {
            watcher_session.done().await;
            watcher_child.cancel();
        });

        on_leader(child.clone()).await;
        watcher.abort();

        leader_flag.set(false);
        info!(%identity, "leadership ended, resigning");
        match tokio::time::timeout(RESIGN_DEADLINE, election.resign()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "resign failed"),
            Err(_) => warn!("resign timed out"),
        }

        if wait_or_exit(&parent, RECAMPAIGN_DELAY).await {
            break;
        }
    }
}

/// Waits `delay` or until `token` is cancelled, whichever comes first.
/// Returns `true` if the token was cancelled (caller should stop looping).
async fn wait_or_exit(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}

/// A lazy, restartable stream of the current leader's campaign value, for
/// diagnostics only (`spec.md` §4.8) — never used by the election loop
/// itself.
pub fn observe_leader(kv: Arc<dyn KvStore>, prefix: String, ttl: Duration) -> BoxStream<'static, hermes_kv::Result<String>> {
    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        let session = match kv.new_session(ttl).await {
            Ok(session) => session,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        };
        let election = kv.new_election(session.as_ref(), &prefix);
        let mut stream = election.observe();
        while let Some(item) = stream.next().await {
            if tx.send(item).await.is_err() {
                break;
            }
        }
    });
    Box::pin(tokio_stream::wrappers::ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_kv::testing::FakeKv;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn election_disabled_runs_pipeline_unconditionally() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let cfg = ElectionConfig {
            enabled: false,
            prefix: "/hermes/election".to_string(),
            lease_ttl_secs: 5,
        };
        let leader_flag = LeaderFlag::new();
        let parent = CancellationToken::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();

        run(kv, &cfg, "host-1".to_string(), leader_flag.clone(), parent, move |token| {
            let ran = ran_clone.clone();
            async move {
                ran.fetch_add(1, Ordering::SeqCst);
                let _ = token;
            }
        })
        .await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(!leader_flag.get());
    }

    #[tokio::test]
    async fn e2e_5_second_candidate_takes_over_after_first_cancels() {
        let kv: Arc<dyn KvStore> = Arc::new(FakeKv::new());
        let cfg = Arc::new(ElectionConfig {
            enabled: true,
            prefix: "/hermes/election".to_string(),
            lease_ttl_secs: 5,
        });

        let flag_a = LeaderFlag::new();
        let parent_a = CancellationToken::new();
        let flag_a_check = flag_a.clone();
        let parent_a_cancel = parent_a.clone();
        let kv_a = kv.clone();
        let cfg_a = cfg.clone();
        let task_a = tokio::spawn(async move {
            run(kv_a, &cfg_a, "a".to_string(), flag_a, parent_a_cancel, |token| async move {
                token.cancelled().await;
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(flag_a_check.get());

        let flag_b = LeaderFlag::new();
        let parent_b = CancellationToken::new();
        let flag_b_check = flag_b.clone();
        let parent_b_cancel = parent_b.clone();
        let kv_b = kv.clone();
        let cfg_b = cfg.clone();
        let task_b = tokio::spawn(async move {
            run(kv_b, &cfg_b, "b".to_string(), flag_b, parent_b_cancel, |token| async move {
                token.cancelled().await;
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(flag_a_check.get());
        assert!(!flag_b_check.get(), "second candidate must not lead while the first holds the key");

        parent_a.cancel();
        task_a.await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), async {
            while !flag_b_check.get() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("second candidate should take over once the first resigns");

        parent_b.cancel();
        task_b.await.unwrap();
    }
}
