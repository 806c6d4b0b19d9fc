//! Watches the gateway self-registration prefix and republishes the full
//! membership list upstream on every change (`spec.md` §4.6).

use hermes_client::ControlPlane;
use hermes_core::{EtcdConfig, InstanceRecord, InstancesReport};
use hermes_kv::KvStore;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Lists every instance record under `etcd.instance_prefix` and PUTs the
/// aggregate to the control plane. Decode failures fall back to an
/// `id`-only record built from the key, per `spec.md` §4.6 step 1.
async fn list_and_report(control: &dyn ControlPlane, kv: &dyn KvStore, etcd: &EtcdConfig) {
    let prefix = format!("{}/", etcd.instance_prefix.trim_end_matches('/'));
    let pairs = match kv.get_prefix(&prefix).await {
        Ok(pairs) => pairs,
        Err(err) => {
            warn!(error = %err, "failed to list instance prefix, skipping this report");
            return;
        }
    };

    let instances: Vec<InstanceRecord> = pairs
        .iter()
        .map(|pair| {
            let fallback_id = pair.key.strip_prefix(&prefix).unwrap_or(&pair.key);
            InstanceRecord::decode_or_fallback(&pair.value, fallback_id)
        })
        .collect();

    let count = instances.len();
    if let Err(err) = control.report_instances(&InstancesReport { instances }).await {
        warn!(error = %err, count, "failed to report instances upstream");
    }
}

/// Runs the instance observer loop until `cancel` fires (`spec.md` §4.6
/// step 4). Watch errors or stream closure trigger a 3 second backoff and a
/// fresh watch, rather than terminating the loop.
#[tracing::instrument(level = "debug", skip_all)]
pub async fn run(control: &dyn ControlPlane, kv: &dyn KvStore, etcd: &EtcdConfig, cancel: CancellationToken) {
    list_and_report(control, kv, etcd).await;

    let prefix = format!("{}/", etcd.instance_prefix.trim_end_matches('/'));

    loop {
        if cancel.is_cancelled() {
            return;
        }

        let mut stream = match kv.watch_prefix(&prefix).await {
            Ok(stream) => stream,
            Err(err) => {
                error!(error = %err, "failed to open instance watch, retrying");
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(WATCH_RETRY_DELAY) => continue,
                }
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                next = stream.next() => match next {
                    Some(Ok(_batch)) => {
                        info!("instance prefix changed, republishing full list");
                        list_and_report(control, kv, etcd).await;
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "instance watch stream errored, reopening");
                        break;
                    }
                    None => {
                        warn!("instance watch stream closed, reopening");
                        break;
                    }
                },
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(WATCH_RETRY_DELAY) => {}
        }
    }
}
