//! Property tests for the reconciler's core invariant (`spec.md` §8,
//! property 1): after `Reconcile`, the KV key set under each kind's prefix
//! equals exactly the desired set, with canonical-equal values.

mod common;

use common::etcd_config;
use hermes_core::{canon, DesiredSnapshot};
use hermes_kv::testing::FakeKv;
use hermes_kv::KvStore;
use hermes_runtime::reconcile;
use proptest::prelude::*;
use std::collections::BTreeSet;

#[derive(Default, Clone)]
struct ArbitraryControlPlane {
    config: std::sync::Mutex<DesiredSnapshot>,
}

#[async_trait::async_trait]
impl hermes_client::ControlPlane for ArbitraryControlPlane {
    async fn get_config(&self) -> hermes_client::Result<hermes_core::ConfigEnvelope> {
        let snapshot = self.config.lock().unwrap();
        Ok(hermes_core::ConfigEnvelope {
            config: DesiredSnapshot {
                domains: snapshot.domains.clone(),
                clusters: snapshot.clusters.clone(),
            },
        })
    }
    async fn get_revision(&self) -> hermes_client::Result<hermes_core::Revision> {
        Ok(hermes_core::Revision(0))
    }
    async fn poll_changes(&self, _since: hermes_core::Revision) -> hermes_client::Result<hermes_core::ChangeResponse> {
        unimplemented!("not exercised by reconcile property tests")
    }
    async fn report_controller_status(
        &self,
        _report: &hermes_core::ControllerStatusReport,
    ) -> hermes_client::Result<()> {
        unimplemented!("not exercised by reconcile property tests")
    }
    async fn report_instances(&self, _report: &hermes_core::InstancesReport) -> hermes_client::Result<()> {
        unimplemented!("not exercised by reconcile property tests")
    }
}

/// A named JSON object with a handful of string-valued extra fields — always
/// carries a non-empty `name`, since nameless objects are defined to be
/// skipped and would make the invariant vacuous.
fn arbitrary_named_object() -> impl Strategy<Value = serde_json::Value> {
    (
        "[a-z][a-z0-9-]{0,12}",
        proptest::collection::vec(("[a-z]{1,6}", "[a-zA-Z0-9 .]{0,20}"), 0..4),
    )
        .prop_map(|(name, extra_fields)| {
            let mut map = serde_json::Map::new();
            map.insert("name".to_string(), serde_json::Value::String(name));
            for (k, v) in extra_fields {
                map.insert(k, serde_json::Value::String(v));
            }
            serde_json::Value::Object(map)
        })
}

fn arbitrary_snapshot() -> impl Strategy<Value = DesiredSnapshot> {
    (
        proptest::collection::vec(arbitrary_named_object(), 0..5),
        proptest::collection::vec(arbitrary_named_object(), 0..5),
    )
        .prop_map(|(domains, clusters)| DesiredSnapshot { domains, clusters })
}

/// Prior KV state under the configured prefixes, unrelated to the desired
/// snapshot: some of it should survive as an update, some should be deleted.
fn arbitrary_prior_state() -> impl Strategy<Value = Vec<(bool, String, serde_json::Value)>> {
    proptest::collection::vec(
        (proptest::bool::ANY, "[a-z][a-z0-9-]{0,12}", arbitrary_named_object()),
        0..5,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reconcile_converges_kv_to_exactly_the_desired_set(
        snapshot in arbitrary_snapshot(),
        prior in arbitrary_prior_state(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let etcd = etcd_config();
            let kv = FakeKv::new();

            for (is_domain, key_name, value) in &prior {
                let prefix = if *is_domain { &etcd.domain_prefix } else { &etcd.cluster_prefix };
                let key = format!("{prefix}/{key_name}");
                kv.put(&key, serde_json::to_vec(value).unwrap()).await.unwrap();
            }

            let control = ArbitraryControlPlane {
                config: std::sync::Mutex::new(snapshot.clone()),
            };

            reconcile::reconcile_once(&control, &kv, &etcd).await.unwrap();

            for (objects, prefix) in [
                (&snapshot.domains, &etcd.domain_prefix),
                (&snapshot.clusters, &etcd.cluster_prefix),
            ] {
                let expected_keys: BTreeSet<String> = objects
                    .iter()
                    .filter_map(hermes_core::object_name)
                    .map(|name| format!("{prefix}/{name}"))
                    .collect();

                let actual = kv.get_prefix(&format!("{prefix}/")).await.unwrap();
                let actual_keys: BTreeSet<String> = actual.iter().map(|pair| pair.key.clone()).collect();
                prop_assert_eq!(&actual_keys, &expected_keys);

                for pair in &actual {
                    let name = pair.key.rsplit('/').next().unwrap();
                    let desired_object = objects.iter().find(|o| hermes_core::object_name(o) == Some(name)).unwrap();
                    let desired_canonical = canon::canonicalize(&serde_json::to_vec(desired_object).unwrap()).unwrap();
                    let actual_canonical = canon::canonicalize(&pair.value).unwrap();
                    prop_assert_eq!(actual_canonical, desired_canonical);
                }
            }
            Ok(())
        })?;
    }
}
