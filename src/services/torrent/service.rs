//! Torrent service implementation.
//!
//! Implements [Service](crate::services::manager::Service) for the librqbit
//! session lifecycle and [TransferEngine] for the download lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use librqbit::api::TorrentIdOrHash;
use librqbit::dht::PersistentDhtConfig;
use librqbit::{AddTorrent, AddTorrentResponse, ManagedTorrent, Session, SessionOptions};
use tracing::{debug, info, warn};

use crate::services::manager::{Service, ServiceHealth};
use crate::services::torrent::client::{
    add_torrent_opts, info_hash_of, status_of, TorrentServiceConfig,
};
use crate::services::torrent::engine::{
    EngineError, EngineStatus, InfoHash, ResolvedSource, TransferEngine,
};

struct TorrentRuntime {
    session: Arc<Session>,
    download_dir: PathBuf,
}

impl TorrentRuntime {
    fn find(&self, hash: &InfoHash) -> Option<(usize, Arc<ManagedTorrent>)> {
        self.session.with_torrents(|iter| {
            for (id, handle) in iter {
                if &info_hash_of(handle) == hash {
                    return Some((id, handle.clone()));
                }
            }
            None
        })
    }

    fn require(&self, hash: &InfoHash) -> Result<(usize, Arc<ManagedTorrent>), EngineError> {
        self.find(hash)
            .ok_or_else(|| EngineError::NotFound(hash.clone()))
    }
}

/// Native torrent client service backed by a librqbit session.
pub struct TorrentService {
    config: TorrentServiceConfig,
    inner: tokio::sync::RwLock<Option<Arc<TorrentRuntime>>>,
}

impl TorrentService {
    /// Create the service. The session is not created until [Service::start] is called.
    pub fn new(config: TorrentServiceConfig) -> Self {
        Self {
            config,
            inner: tokio::sync::RwLock::new(None),
        }
    }

    async fn runtime(&self) -> Result<Arc<TorrentRuntime>, EngineError> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or_else(|| EngineError::Unavailable("torrent service not started".to_string()))
    }
}

#[async_trait]
impl Service for TorrentService {
    fn name(&self) -> &str {
        "torrent"
    }

    async fn start(&self) -> Result<()> {
        info!(service = "torrent", "Torrent service starting");
        let config = &self.config;

        let download_dir = match tokio::fs::create_dir_all(&config.download_dir).await {
            Ok(()) => config.download_dir.clone(),
            Err(e) => {
                let temp = std::env::temp_dir().join("courier-downloads");
                warn!(path = %config.download_dir.display(), error = %e, fallback = %temp.display(),
                    "Could not create download directory, using temp directory");
                tokio::fs::create_dir_all(&temp)
                    .await
                    .context("Failed to create fallback download directory")?;
                temp
            }
        };

        let session_dir = match tokio::fs::create_dir_all(&config.session_dir).await {
            Ok(()) => config.session_dir.clone(),
            Err(e) => {
                let temp = std::env::temp_dir().join("courier-session");
                warn!(path = %config.session_dir.display(), error = %e, fallback = %temp.display(),
                    "Could not create session directory, using temp directory");
                tokio::fs::create_dir_all(&temp)
                    .await
                    .context("Failed to create fallback session directory")?;
                temp
            }
        };

        let dht_config = if config.enable_dht {
            Some(PersistentDhtConfig {
                config_filename: Some(session_dir.join("dht.json")),
                ..Default::default()
            })
        } else {
            None
        };

        let session_opts = SessionOptions {
            disable_dht: !config.enable_dht,
            disable_dht_persistence: !config.enable_dht,
            dht_config,
            persistence: Some(librqbit::SessionPersistenceConfig::Json {
                folder: Some(session_dir.clone()),
            }),
            listen_port_range: if config.listen_port > 0 {
                Some(config.listen_port..config.listen_port + 1)
            } else {
                None
            },
            ..Default::default()
        };

        let session = Session::new_with_opts(download_dir.clone(), session_opts)
            .await
            .context("Failed to create torrent session")?;

        *self.inner.write().await = Some(Arc::new(TorrentRuntime {
            session,
            download_dir,
        }));
        info!(service = "torrent", "Torrent service started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!(service = "torrent", "Torrent service stopping");
        if let Some(runtime) = self.inner.write().await.take() {
            runtime.session.stop().await;
        }
        info!(service = "torrent", "Torrent service stopped");
        Ok(())
    }

    async fn health(&self) -> Result<ServiceHealth> {
        if self.inner.read().await.is_some() {
            Ok(ServiceHealth::healthy())
        } else {
            Ok(ServiceHealth::degraded("torrent service not started"))
        }
    }
}

#[async_trait]
impl TransferEngine for TorrentService {
    async fn submit(&self, source: &ResolvedSource) -> Result<InfoHash, EngineError> {
        let r = self.runtime().await?;
        let add = match source {
            ResolvedSource::Magnet(uri) => AddTorrent::from_url(uri.clone()),
            ResolvedSource::Url(url) => AddTorrent::from_url(url.clone()),
            ResolvedSource::Bytes(bytes) => AddTorrent::from_bytes(bytes.clone()),
        };

        let response = r
            .session
            .add_torrent(add, Some(add_torrent_opts(&self.config.allowed_extensions)))
            .await
            .map_err(|e| EngineError::Rejected(format!("{:#}", e)))?;

        match response {
            AddTorrentResponse::Added(id, handle) => {
                let hash = info_hash_of(&handle);
                info!(id = id, info_hash = %hash, name = ?handle.name(), "Torrent added");
                Ok(hash)
            }
            AddTorrentResponse::AlreadyManaged(id, handle) => {
                let hash = info_hash_of(&handle);
                debug!(id = id, info_hash = %hash, "Torrent already managed");
                Ok(hash)
            }
            AddTorrentResponse::ListOnly(_) => Err(EngineError::Rejected(
                "torrent was added in list-only mode".to_string(),
            )),
        }
    }

    async fn pause(&self, hash: &InfoHash) -> Result<(), EngineError> {
        let r = self.runtime().await?;
        let (_, handle) = r.require(hash)?;
        r.session
            .pause(&handle)
            .await
            .map_err(|e| EngineError::Unavailable(format!("failed to pause: {:#}", e)))?;
        debug!(info_hash = %hash, "Torrent paused");
        Ok(())
    }

    async fn resume(&self, hash: &InfoHash) -> Result<(), EngineError> {
        let r = self.runtime().await?;
        let (_, handle) = r.require(hash)?;
        r.session
            .unpause(&handle)
            .await
            .map_err(|e| EngineError::Unavailable(format!("failed to resume: {:#}", e)))?;
        debug!(info_hash = %hash, "Torrent resumed");
        Ok(())
    }

    async fn remove(&self, hash: &InfoHash, delete_data: bool) -> Result<(), EngineError> {
        let r = self.runtime().await?;
        let (id, _) = r.require(hash)?;
        r.session
            .delete(TorrentIdOrHash::Id(id), delete_data)
            .await
            .map_err(|e| EngineError::Unavailable(format!("failed to remove: {:#}", e)))?;
        info!(info_hash = %hash, delete_data, "Torrent removed");
        Ok(())
    }

    async fn status(&self, hash: &InfoHash) -> Result<EngineStatus, EngineError> {
        let r = self.runtime().await?;
        let (_, handle) = r.require(hash)?;
        Ok(status_of(&handle, &r.download_dir))
    }

    async fn contains(&self, hash: &InfoHash) -> bool {
        match self.runtime().await {
            Ok(r) => r.find(hash).is_some(),
            Err(_) => false,
        }
    }
}
