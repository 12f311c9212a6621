//! Durable snapshot of queues and active jobs.
//!
//! One JSON document, replaced atomically (write to a sibling temp file, then
//! rename). Writes are serialized by an async mutex so two snapshots never
//! interleave. Mutations only *schedule* a write through [SnapshotWriter];
//! the writer coalesces bursts and always persists the latest state.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::error::DownloadError;
use super::types::PersistedSnapshot;

pub struct SnapshotStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; a missing or unreadable file yields an empty one.
    pub async fn load(&self) -> PersistedSnapshot {
        match self.try_load().await {
            Ok(Some(snapshot)) => {
                info!(
                    path = %self.path.display(),
                    active = snapshot.active_jobs.len(),
                    queues = snapshot.queues.len(),
                    "Loaded download snapshot"
                );
                snapshot
            }
            Ok(None) => {
                debug!(path = %self.path.display(), "No download snapshot, starting empty");
                PersistedSnapshot::default()
            }
            Err(e) => {
                error!(error = %e, "Ignoring download snapshot, starting empty");
                PersistedSnapshot::default()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<PersistedSnapshot>, DownloadError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DownloadError::SnapshotCorrupt {
                    path: self.path.clone(),
                    reason: e.to_string(),
                });
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DownloadError::SnapshotCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Write `snapshot`, replacing the previous one atomically.
    pub async fn save(&self, snapshot: &PersistedSnapshot) -> Result<(), DownloadError> {
        let _guard = self.write_lock.lock().await;
        let fs_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DownloadError::Filesystem { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(fs_err(parent))?;
        }

        let json = serde_json::to_vec_pretty(snapshot).map_err(|e| DownloadError::SnapshotCorrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await.map_err(fs_err(&tmp))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(fs_err(&self.path))?;
        debug!(
            path = %self.path.display(),
            active = snapshot.active_jobs.len(),
            "Saved download snapshot"
        );
        Ok(())
    }
}

/// Background writer: latest scheduled snapshot wins.
pub struct SnapshotWriter {
    tx: watch::Sender<Option<PersistedSnapshot>>,
}

impl SnapshotWriter {
    /// Spawn the write loop. It ends when the writer is dropped, after
    /// flushing whatever was scheduled last.
    pub fn spawn(store: Arc<SnapshotStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = watch::channel::<Option<PersistedSnapshot>>(None);
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let pending = rx.borrow_and_update().clone();
                if let Some(snapshot) = pending {
                    if let Err(e) = store.save(&snapshot).await {
                        warn!(error = %e, "Failed to write download snapshot");
                    }
                }
            }
            debug!("Snapshot writer stopped");
        });
        (Self { tx }, handle)
    }

    pub fn schedule(&self, snapshot: PersistedSnapshot) {
        self.tx.send_replace(Some(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::downloads::types::{JobDescriptor, JobId, JobState, OwnerId, Phase, Source};
    use pretty_assertions::assert_eq;

    fn sample() -> PersistedSnapshot {
        let owner = OwnerId::new("chat-1");
        let descriptor = JobDescriptor::new(
            Source::Magnet {
                uri: "magnet:?xt=urn:btih:c12fe1c06bba254a9dc9f519b335aa7c1367a88a".into(),
            },
            owner.clone(),
            "Severance.S01E01.1080p",
        );
        let id = JobId::new();
        let mut state = JobState::new(id, descriptor.clone());
        state.phase = Phase::Transferring;
        state.info_hash = descriptor.source.known_info_hash();

        let mut snapshot = PersistedSnapshot::default();
        snapshot.active_jobs.insert(id, state);
        snapshot.queues.insert(
            owner.clone(),
            vec![JobDescriptor::new(
                Source::Url { url: "https://example.org/b.torrent".into() },
                owner,
                "Severance.S01E02.1080p",
            )],
        );
        snapshot
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state/persistence.json"));
        let snapshot = sample();

        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await, snapshot);
        assert!(!dir.path().join("state/persistence.json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("none.json"));
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persistence.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = SnapshotStore::new(&path);
        assert!(store.load().await.is_empty());
        assert!(store.try_load().await.is_err());
    }

    #[tokio::test]
    async fn writer_flushes_latest_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SnapshotStore::new(dir.path().join("p.json")));
        let (writer, handle) = SnapshotWriter::spawn(store.clone());

        writer.schedule(PersistedSnapshot::default());
        let latest = sample();
        writer.schedule(latest.clone());
        drop(writer);
        handle.await.unwrap();

        assert_eq!(store.load().await, latest);
    }
}
