//! Wires the full controller pipeline together under the leader context:
//! initial reconcile, revision bootstrap, reconcile loop, poller, instance
//! observer, heartbeat reporter, and the single-writer main loop
//! (`spec.md` §4.9 startup sequence).

use crate::elect::{self, LeaderFlag};
use crate::writer;
use chrono::Utc;
use hermes_client::ControlPlane;
use hermes_core::{Config, SharedRevision};
use hermes_kv::KvStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Everything the pipeline needs, assembled once at process startup and
/// shared across leadership terms.
pub struct Pipeline {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
    pub control: Arc<dyn ControlPlane>,
    pub identity: String,
    pub started_at: chrono::DateTime<Utc>,
    pub revision: SharedRevision,
    pub leader_flag: LeaderFlag,
}

/// Runs the election supervisor for the process lifetime: campaigns (unless
/// election is disabled), and runs [`run_pipeline`] under the leader context
/// for each term held.
pub async fn run(pipeline: Pipeline, parent: CancellationToken) {
    let kv = pipeline.kv.clone();
    let election_cfg = pipeline.config.election.clone();
    let identity = pipeline.identity.clone();
    let leader_flag = pipeline.leader_flag.clone();

    elect::run(kv, &election_cfg, identity, leader_flag, parent, |leader_token| {
        run_pipeline(&pipeline, leader_token)
    })
    .await;
}

/// Runs the pipeline for a single leadership term, until `leader_token` is
/// cancelled. Reconcile and poll are serialized through the writer's main
/// loop; the instance observer and heartbeat reporter are exempt per
/// `spec.md` §4.9, since they write to disjoint endpoints.
async fn run_pipeline(pipeline: &Pipeline, leader_token: CancellationToken) {
    let control = pipeline.control.as_ref();
    let kv = pipeline.kv.as_ref();
    let etcd = &pipeline.config.etcd;

    info!("running initial full reconcile");
    match crate::reconcile::reconcile_once(control, kv, etcd).await {
        Ok(outcome) => info!(applied = outcome.applied, failed = outcome.failed, "initial reconcile complete"),
        Err(err) => warn!(error = %err, "initial reconcile failed, proceeding with startup anyway"),
    }

    match control.get_revision().await {
        Ok(revision) => {
            pipeline.revision.set(revision);
            if let Err(err) = kv.put(&etcd.config_revision_key(), revision.0.to_string().into_bytes()).await {
                warn!(error = %err, "failed to publish bootstrap revision to KV meta key");
            }
        }
        Err(err) => warn!(error = %err, "failed to fetch initial revision, starting from last known value"),
    }

    let (writer_handle, writer_rx) = writer::channel();

    let reconcile_loop = {
        let interval = pipeline.config.control_plane.reconcile_interval();
        let leader_token = leader_token.clone();
        let writer_handle = writer_handle.clone();
        async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = leader_token.cancelled() => return,
                    _ = ticker.tick() => {
                        if writer_handle.reconcile().await.is_none() {
                            return;
                        }
                    }
                }
            }
        }
    };

    let instance_observer = crate::instances::run(control, kv, etcd, leader_token.clone());

    let is_leader = pipeline.leader_flag.shared();
    let heartbeat_reporter = crate::heartbeat::run(
        control,
        &pipeline.identity,
        pipeline.started_at,
        &pipeline.revision,
        &is_leader,
        leader_token.clone(),
    );

    let main_loop = writer::run(
        control,
        kv,
        etcd,
        &pipeline.revision,
        pipeline.config.control_plane.poll_interval(),
        writer_rx,
        leader_token.clone(),
    );

    tokio::join!(reconcile_loop, instance_observer, heartbeat_reporter, main_loop);
}
