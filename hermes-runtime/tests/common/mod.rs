use hermes_client::ControlPlane;
use hermes_core::{
    ChangeResponse, ConfigEnvelope, ControllerStatusReport, DesiredSnapshot, InstancesReport, Revision,
};
use std::sync::Mutex;

/// A scripted control-plane fake for end-to-end tests: `config` is returned
/// verbatim from `get_config`, and `changes` is popped front-to-back on
/// successive `poll_changes` calls regardless of the `since` argument.
#[derive(Default)]
pub struct ScriptedControlPlane {
    pub config: Mutex<DesiredSnapshot>,
    pub changes: Mutex<std::collections::VecDeque<ChangeResponse>>,
    pub reported_instances: Mutex<Vec<InstancesReport>>,
}

#[async_trait::async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn get_config(&self) -> hermes_client::Result<ConfigEnvelope> {
        let snapshot = self.config.lock().unwrap();
        Ok(ConfigEnvelope {
            config: DesiredSnapshot {
                domains: snapshot.domains.clone(),
                clusters: snapshot.clusters.clone(),
            },
        })
    }

    async fn get_revision(&self) -> hermes_client::Result<Revision> {
        Ok(Revision(0))
    }

    async fn poll_changes(&self, _since: Revision) -> hermes_client::Result<ChangeResponse> {
        Ok(self.changes.lock().unwrap().pop_front().unwrap_or(ChangeResponse {
            events: vec![],
            revision: Revision(0),
            total: 0,
        }))
    }

    async fn report_controller_status(&self, _report: &ControllerStatusReport) -> hermes_client::Result<()> {
        Ok(())
    }

    async fn report_instances(&self, report: &InstancesReport) -> hermes_client::Result<()> {
        self.reported_instances.lock().unwrap().push(InstancesReport {
            instances: report.instances.clone(),
        });
        Ok(())
    }
}

pub fn etcd_config() -> hermes_core::EtcdConfig {
    hermes_core::EtcdConfig {
        endpoints: vec!["http://127.0.0.1:2379".to_string()],
        username: None,
        password: None,
        domain_prefix: "/hermes/domains".to_string(),
        cluster_prefix: "/hermes/clusters".to_string(),
        instance_prefix: "/hermes/instances".to_string(),
        meta_prefix: "/hermes/meta".to_string(),
    }
}
