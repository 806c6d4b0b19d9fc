//! Periodic controller liveness reporting (`spec.md` §4.7).

use chrono::Utc;
use hermes_client::ControlPlane;
use hermes_core::{ControllerStatus, ControllerStatusReport, SharedRevision};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
const SHUTDOWN_REPORT_DEADLINE: Duration = Duration::from_secs(3);

/// Runs the heartbeat reporter until `cancel` fires, then sends one final
/// best-effort `shutting_down` report with a hard 3 second deadline
/// (`spec.md` §4.7). An initial report is sent immediately on entry.
#[tracing::instrument(level = "debug", skip_all, fields(id = %identity))]
pub async fn run(
    control: &dyn ControlPlane,
    identity: &str,
    started_at: chrono::DateTime<Utc>,
    revision: &SharedRevision,
    is_leader: &Arc<AtomicBool>,
    cancel: CancellationToken,
) {
    let report_once = |status: ControllerStatus| ControllerStatusReport {
        id: identity.to_string(),
        status,
        started_at,
        last_heartbeat_at: Utc::now(),
        config_revision: revision.get(),
        is_leader: is_leader.load(Ordering::SeqCst),
    };

    if let Err(err) = control.report_controller_status(&report_once(ControllerStatus::Running)).await {
        warn!(error = %err, "initial heartbeat report failed");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                if let Err(err) = control.report_controller_status(&report_once(ControllerStatus::Running)).await {
                    warn!(error = %err, "heartbeat report failed");
                }
            }
        }
    }

    let final_report = report_once(ControllerStatus::ShuttingDown);
    match tokio::time::timeout(SHUTDOWN_REPORT_DEADLINE, control.report_controller_status(&final_report)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "final shutdown heartbeat report failed"),
        Err(_) => warn!("final shutdown heartbeat report timed out"),
    }
}
