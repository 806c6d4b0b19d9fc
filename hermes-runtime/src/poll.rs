//! The short-poll incremental change stream (`spec.md` §4.5).

use crate::applier;
use hermes_client::ControlPlane;
use hermes_core::{EtcdConfig, Revision, SharedRevision};
use hermes_kv::KvStore;
use tracing::warn;

/// Summary of one poll tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct PollOutcome {
    pub applied: usize,
    pub failed: usize,
    pub revision_advanced: bool,
}

/// Runs one poll tick: fetch events strictly after `revision`'s current
/// value, apply each in order, and advance the stored revision (both the
/// in-process atomic and the KV meta key) if the response revision is
/// greater. Per `spec.md` §4.5, per-event failures don't stop the batch and
/// don't block the revision advance — the next reconcile repairs any gap.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn poll_once(
    control: &dyn ControlPlane,
    kv: &dyn KvStore,
    etcd: &EtcdConfig,
    revision: &SharedRevision,
) -> hermes_client::Result<PollOutcome> {
    let since = revision.get();
    let response = control.poll_changes(since).await?;

    let mut outcome = PollOutcome::default();
    for event in &response.events {
        match applier::apply(event, kv, etcd).await {
            Ok(()) => outcome.applied += 1,
            Err(err) => {
                outcome.failed += 1;
                warn!(error = %err, revision = %event.revision, kind = %event.kind, name = %event.name, "poll apply failed, will be repaired on next reconcile");
            }
        }
    }

    if response.revision > since {
        revision.advance_to(response.revision);
        outcome.revision_advanced = true;
        if let Err(err) = kv.put(&etcd.config_revision_key(), response.revision.0.to_string().into_bytes()).await {
            warn!(error = %err, revision = %response.revision, "failed to persist config_revision meta key");
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hermes_core::{Action, ChangeEvent, ChangeResponse, ConfigEnvelope, ControllerStatusReport, InstancesReport};
    use hermes_kv::testing::FakeKv;
    use std::sync::Mutex;

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

    fn change_event(revision: i64, kind: &str, name: &str) -> ChangeEvent {
        let raw = format!(
            r#"{{"revision":{revision},"kind":"{kind}","name":"{name}","action":"create","{kind}":{{"name":"{name}"}}}}"#
        );
        serde_json::from_str(&raw).unwrap()
    }

    /// A scripted control-plane fake: each call to `poll_changes` returns the
    /// next response in a fixed script, regardless of the `since` argument,
    /// so tests can simulate individually-monotonic-looking ticks.
    struct ScriptedControlPlane {
        responses: Mutex<std::collections::VecDeque<ChangeResponse>>,
    }

    #[async_trait::async_trait]
    impl hermes_client::ControlPlane for ScriptedControlPlane {
        async fn get_config(&self) -> hermes_client::Result<ConfigEnvelope> {
            unimplemented!("not exercised by poll tests")
        }
        async fn get_revision(&self) -> hermes_client::Result<Revision> {
            unimplemented!("not exercised by poll tests")
        }
        async fn poll_changes(&self, _since: Revision) -> hermes_client::Result<ChangeResponse> {
            Ok(self.responses.lock().unwrap().pop_front().expect("script exhausted"))
        }
        async fn report_controller_status(&self, _report: &ControllerStatusReport) -> hermes_client::Result<()> {
            unimplemented!("not exercised by poll tests")
        }
        async fn report_instances(&self, _report: &InstancesReport) -> hermes_client::Result<()> {
            unimplemented!("not exercised by poll tests")
        }
    }

    #[tokio::test]
    async fn revision_never_decreases_across_several_ticks() {
        let etcd = etcd_config();
        let kv = FakeKv::new();
        let revision = SharedRevision::new();

        let control = ScriptedControlPlane {
            responses: Mutex::new(
                vec![
                    ChangeResponse {
                        events: vec![change_event(1, "domain", "d1")],
                        revision: Revision(1),
                        total: 1,
                    },
                    ChangeResponse {
                        events: vec![],
                        revision: Revision(1),
                        total: 0,
                    },
                    ChangeResponse {
                        events: vec![change_event(4, "cluster", "c1")],
                        revision: Revision(4),
                        total: 1,
                    },
                ]
                .into(),
            ),
        };

        let outcome1 = poll_once(&control, &kv, &etcd, &revision).await.unwrap();
        assert!(outcome1.revision_advanced);
        assert_eq!(revision.get(), Revision(1));

        let outcome2 = poll_once(&control, &kv, &etcd, &revision).await.unwrap();
        assert!(!outcome2.revision_advanced);
        assert_eq!(revision.get(), Revision(1));

        let outcome3 = poll_once(&control, &kv, &etcd, &revision).await.unwrap();
        assert!(outcome3.revision_advanced);
        assert_eq!(revision.get(), Revision(4));

        let meta = kv.get_prefix(&etcd.config_revision_key()).await.unwrap();
        assert_eq!(meta[0].value, b"4");
    }

    #[test]
    fn action_enum_covers_all_non_delete_variants() {
        assert!(!Action::Create.is_delete());
        assert!(!Action::Update.is_delete());
        assert!(!Action::Rollback.is_delete());
        assert!(!Action::Import.is_delete());
        assert!(Action::Delete.is_delete());
    }
}
