//! The single-writer main loop (`spec.md` §4.9): serializes reconcile
//! requests and poll ticks so they never race each other with concurrent KV
//! writes against the same key space.

use crate::poll::{self, PollOutcome};
use crate::reconcile::{self, ReconcileOutcome};
use hermes_client::ControlPlane;
use hermes_core::{EtcdConfig, SharedRevision};
use hermes_kv::KvStore;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What the periodic reconcile loop requests of the writer.
pub enum WriterRequestKind {
    Reconcile,
}

/// One request sent to the writer loop, with a reply channel for the result.
pub struct WriterRequest {
    pub kind: WriterRequestKind,
    pub reply: oneshot::Sender<WriterResult>,
}

/// The result of handling a [`WriterRequest`].
pub enum WriterResult {
    Reconcile(hermes_client::Result<ReconcileOutcome>),
}

/// A handle periodic tasks use to submit requests to the writer loop.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterRequest>,
}

impl WriterHandle {
    /// Sends a reconcile request and awaits the writer's reply.
    pub async fn reconcile(&self) -> Option<hermes_client::Result<ReconcileOutcome>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriterRequest {
                kind: WriterRequestKind::Reconcile,
                reply,
            })
            .await
            .ok()?;
        match rx.await.ok()? {
            WriterResult::Reconcile(result) => Some(result),
        }
    }
}

/// Creates a writer handle/receiver pair. The channel has a small fixed
/// buffer, per `spec.md` §5 ("typed channels with small fixed buffers").
pub fn channel() -> (WriterHandle, mpsc::Receiver<WriterRequest>) {
    let (tx, rx) = mpsc::channel(4);
    (WriterHandle { tx }, rx)
}

/// Runs the main loop until `cancel` fires. Selects over cancellation,
/// incoming reconcile requests, and the poll tick timer — the three sources
/// named in `spec.md` §4.9.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn run(
    control: &dyn ControlPlane,
    kv: &dyn KvStore,
    etcd: &EtcdConfig,
    revision: &SharedRevision,
    poll_interval: std::time::Duration,
    mut requests: mpsc::Receiver<WriterRequest>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so the caller's own initial
    // poll/reconcile sequencing (spec.md §4.9 startup sequence) isn't raced.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("main loop cancelled");
                return;
            }
            Some(request) = requests.recv() => {
                match request.kind {
                    WriterRequestKind::Reconcile => {
                        let result = reconcile::reconcile_once(control, kv, etcd).await;
                        if let Ok(outcome) = &result {
                            info!(applied = outcome.applied, failed = outcome.failed, "reconcile complete");
                        }
                        let _ = request.reply.send(WriterResult::Reconcile(result));
                    }
                }
            }
            _ = ticker.tick() => {
                match poll::poll_once(control, kv, etcd, revision).await {
                    Ok(PollOutcome { applied, failed, .. }) => {
                        if applied > 0 || failed > 0 {
                            info!(applied, failed, "poll tick complete");
                        }
                    }
                    Err(err) => warn!(error = %err, "poll tick failed, will retry next tick"),
                }
            }
        }
    }
}
