//! Translates a single [`ChangeEvent`] into one KV write or delete
//! (`spec.md` §4.3).

use hermes_core::{Action, ChangeEvent, EtcdConfig, Kind};
use hermes_kv::KvStore;
use tracing::{info, warn};

/// The applier's own error type: a thin wrapper over the KV adapter's error,
/// kept distinct so callers can match on it without depending on
/// `hermes-kv`'s error variants that don't apply here (connect failure).
#[derive(Debug, thiserror::Error)]
#[error("apply failed: {0}")]
pub struct ApplyError(#[from] pub hermes_kv::Error);

/// Applies one change event against `kv`, per the rules in `spec.md` §4.3:
/// unknown kinds are a no-op success, deletes remove the key, everything
/// else upserts `payload` byte-exact at `prefix(kind)/name`.
#[tracing::instrument(level = "debug", skip(kv, etcd), fields(revision = %event.revision, kind = %event.kind, name = %event.name))]
pub async fn apply(event: &ChangeEvent, kv: &dyn KvStore, etcd: &EtcdConfig) -> Result<(), ApplyError> {
    let Some(kind) = Kind::parse(&event.kind) else {
        warn!(kind = %event.kind, "unknown change event kind, skipping");
        return Ok(());
    };

    let key = format!("{}/{}", kind.prefix(etcd).trim_end_matches('/'), event.name);

    if event.action.is_delete() {
        kv.delete(&key).await?;
        info!(%key, "deleted key");
        return Ok(());
    }

    let Some(payload) = event.raw_payload() else {
        warn!(%key, action = ?event.action, "non-delete change event missing payload, skipping");
        return Ok(());
    };

    kv.put(&key, payload.get().as_bytes().to_vec()).await?;
    info!(%key, "upserted key");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_kv::testing::FakeKv;

    fn etcd_config() -> EtcdConfig {
        EtcdConfig {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            username: None,
            password: None,
            domain_prefix: "/hermes/domains".to_string(),
            cluster_prefix: "/hermes/clusters".to_string(),
            instance_prefix: "/hermes/instances".to_string(),
            meta_prefix: "/hermes/meta".to_string(),
        }
    }

    #[tokio::test]
    async fn e2e_4_unknown_kind_is_skipped() {
        let kv = FakeKv::new();
        let etcd = etcd_config();
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "revision": 1,
            "kind": "mystery",
            "name": "x",
            "action": "create",
        }))
        .unwrap();

        apply(&event, &kv, &etcd).await.unwrap();
        assert!(kv.get_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_absent_key_succeeds() {
        let kv = FakeKv::new();
        let etcd = etcd_config();
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "revision": 1,
            "kind": "domain",
            "name": "never-existed",
            "action": "delete",
        }))
        .unwrap();

        apply(&event, &kv, &etcd).await.unwrap();
    }

    #[tokio::test]
    async fn repeated_apply_of_same_event_is_idempotent() {
        let kv = FakeKv::new();
        let etcd = etcd_config();
        let event: ChangeEvent = serde_json::from_value(serde_json::json!({
            "revision": 1,
            "kind": "cluster",
            "name": "c1",
            "action": "create",
            "cluster": {"name": "c1", "type": "random"},
        }))
        .unwrap();

        apply(&event, &kv, &etcd).await.unwrap();
        apply(&event, &kv, &etcd).await.unwrap();

        let pairs = kv.get_prefix(etcd.cluster_prefix.as_str()).await.unwrap();
        assert_eq!(pairs.len(), 1);
    }
}
