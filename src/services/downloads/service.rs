//! [Service] wrapper for the download lifecycle.
//!
//! Start restores the persisted snapshot and starts the status sinks; stop
//! detaches running jobs and writes the final snapshot.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::notify::{spawn_sink, StatusSink};
use super::registry::DownloadManager;
use super::store::SnapshotStore;
use crate::services::manager::{Service, ServiceHealth};

pub struct DownloadService {
    manager: DownloadManager,
    store: Arc<SnapshotStore>,
    sinks: Vec<Arc<dyn StatusSink>>,
    sink_cancel: CancellationToken,
    sink_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadService {
    pub fn new(
        manager: DownloadManager,
        store: Arc<SnapshotStore>,
        sinks: Vec<Arc<dyn StatusSink>>,
    ) -> Self {
        Self {
            manager,
            store,
            sinks,
            sink_cancel: CancellationToken::new(),
            sink_tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn manager(&self) -> &DownloadManager {
        &self.manager
    }
}

#[async_trait]
impl Service for DownloadService {
    fn name(&self) -> &str {
        "downloads"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["torrent".to_string()]
    }

    async fn start(&self) -> Result<()> {
        info!(service = "downloads", "Download service starting");
        {
            let mut tasks = self.sink_tasks.lock();
            for sink in &self.sinks {
                tasks.push(spawn_sink(
                    self.manager.notifier(),
                    sink.clone(),
                    self.sink_cancel.clone(),
                ));
            }
        }

        let snapshot = self.store.load().await;
        self.manager.restore(snapshot).await;
        info!(service = "downloads", "Download service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!(service = "downloads", "Download service stopping");
        self.manager.shutdown().await;

        self.sink_cancel.cancel();
        let tasks: Vec<_> = self.sink_tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        info!(service = "downloads", "Download service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        let finished_sinks = self
            .sink_tasks
            .lock()
            .iter()
            .filter(|t| t.is_finished())
            .count();
        if finished_sinks > 0 && !self.sink_cancel.is_cancelled() {
            return Ok(ServiceHealth::degraded(format!(
                "{} status sink(s) stopped",
                finished_sinks
            )));
        }
        Ok(ServiceHealth::healthy())
    }
}
