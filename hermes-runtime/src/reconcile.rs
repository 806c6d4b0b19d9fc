//! The diff-and-apply reconciliation pass (`spec.md` §4.4).

use hermes_client::ControlPlane;
use hermes_core::{canon, object_name, EtcdConfig, Kind};
use hermes_kv::KvStore;
use std::collections::BTreeMap;
use tracing::warn;

/// One KV mutation emitted by [`diff`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

/// Computes the minimal put/delete set that brings `actual` in line with
/// `desired`, per `spec.md` §4.4.4. Pure and I/O-free so it can be exercised
/// directly by property tests. `BTreeMap` is used (rather than `HashMap`) so
/// the emitted order is deterministic for tests, even though production
/// consumers must tolerate either ordering.
pub fn diff(desired: &BTreeMap<String, Vec<u8>>, actual: &BTreeMap<String, Vec<u8>>) -> Vec<KvOp> {
    let mut ops = Vec::new();

    for (key, value) in desired {
        match actual.get(key) {
            None => ops.push(KvOp::Put {
                key: key.clone(),
                value: value.clone(),
            }),
            Some(actual_value) => {
                let matches = canon::canonicalize(actual_value)
                    .map(|canon_actual| &canon_actual == value)
                    .unwrap_or(false);
                if !matches {
                    ops.push(KvOp::Put {
                        key: key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
    }

    for key in actual.keys() {
        if !desired.contains_key(key) {
            ops.push(KvOp::Delete { key: key.clone() });
        }
    }

    ops
}

/// Summary of one reconcile pass, for logging and for the writer's reply to
/// the periodic reconcile loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOutcome {
    pub applied: usize,
    pub failed: usize,
}

fn desired_map_for_kind(objects: &[serde_json::Value], kind: Kind, etcd: &EtcdConfig) -> BTreeMap<String, Vec<u8>> {
    let prefix = kind.prefix(etcd).trim_end_matches('/');
    let mut map = BTreeMap::new();
    for object in objects {
        let Some(name) = object_name(object) else {
            warn!(kind = %kind, "desired object missing non-empty name, skipping");
            continue;
        };
        let canonical = match canon::canonicalize(&serde_json::to_vec(object).expect("serde_json::Value always serializes")) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(kind = %kind, name, error = %err, "failed to canonicalize desired object, skipping");
                continue;
            }
        };
        map.insert(format!("{prefix}/{name}"), canonical);
    }
    map
}

async fn actual_map_for_kind(kv: &dyn KvStore, kind: Kind, etcd: &EtcdConfig) -> hermes_kv::Result<BTreeMap<String, Vec<u8>>> {
    let prefix = format!("{}/", kind.prefix(etcd).trim_end_matches('/'));
    let pairs = kv.get_prefix(&prefix).await?;
    Ok(pairs.into_iter().map(|pair| (pair.key, pair.value)).collect())
}

async fn apply_ops(ops: Vec<KvOp>, kv: &dyn KvStore) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    for op in ops {
        let result = match &op {
            KvOp::Put { key, value } => kv.put(key, value.clone()).await,
            KvOp::Delete { key } => kv.delete(key).await,
        };
        match result {
            Ok(()) => outcome.applied += 1,
            Err(err) => {
                outcome.failed += 1;
                warn!(error = %err, op = ?op, "reconcile operation failed, will be repaired on next pass");
            }
        }
    }
    outcome
}

/// Runs one full reconcile pass: fetch the desired snapshot, list actual KV
/// contents per kind, diff, and apply sequentially (`spec.md` §4.4 steps 1-5).
#[tracing::instrument(level = "debug", skip_all)]
pub async fn reconcile_once(
    control: &dyn ControlPlane,
    kv: &dyn KvStore,
    etcd: &EtcdConfig,
) -> hermes_client::Result<ReconcileOutcome> {
    let envelope = control.get_config().await?;

    let mut outcome = ReconcileOutcome::default();
    for (objects, kind) in [
        (&envelope.config.domains, Kind::Domain),
        (&envelope.config.clusters, Kind::Cluster),
    ] {
        let desired = desired_map_for_kind(objects, kind, etcd);
        let actual = match actual_map_for_kind(kv, kind, etcd).await {
            Ok(actual) => actual,
            Err(err) => {
                warn!(%kind, error = %err, "failed to list actual KV state, skipping this kind this pass");
                continue;
            }
        };
        let ops = diff(&desired, &actual);
        let kind_outcome = apply_ops(ops, kv).await;
        outcome.applied += kind_outcome.applied;
        outcome.failed += kind_outcome.failed;
    }

    Ok(outcome)
}
