//! Periodic progress polling for one transferring job.
//!
//! Each tick polls the engine with no lock held, then hands the status to
//! [DownloadManager::publish_progress], which checks the cancellation guard
//! and emits the payload inside one critical section. The reporter also
//! notices when the transfer has finished and tells the job task.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::job::StatusProbe;
use super::registry::{DownloadManager, ReportOutcome};
use super::types::JobId;
use crate::services::torrent::{EngineFile, EngineStatus};

pub(crate) async fn run(
    manager: DownloadManager,
    job_id: JobId,
    probe: StatusProbe,
    period: Duration,
    completed: oneshot::Sender<Vec<EngineFile>>,
    stop: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<EngineStatus> = None;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let status = match probe.status().await {
            Ok(status) => {
                last = Some(status.clone());
                status
            }
            Err(e) => {
                // transient: report the last known numbers, retry next tick
                warn!(job_id = %job_id, info_hash = %probe.hash(), error = %e, "Status poll failed");
                match &last {
                    Some(status) => status.clone(),
                    None => continue,
                }
            }
        };

        if status.finished {
            debug!(job_id = %job_id, "Transfer finished");
            let _ = completed.send(status.files);
            break;
        }

        match manager.publish_progress(job_id, &status) {
            ReportOutcome::Sent | ReportOutcome::Suppressed => {}
            ReportOutcome::Skipped => {
                if !manager.is_active(job_id) {
                    break;
                }
            }
        }
    }
    debug!(job_id = %job_id, "Reporter stopped");
}
