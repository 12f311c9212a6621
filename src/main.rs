//! Courier - chat-driven media downloads
//!
//! Starts the torrent engine and the download lifecycle, then serves the
//! REST adapter used by the chat front-end.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use courier::app::{build_app, AppState};
use courier::config::Config;
use courier::services::downloads::{
    DownloadManager, DownloadService, LogSink, ManagerSettings, PostProcessor, SnapshotStore,
    StatusSink, WebhookSink,
};
use courier::services::logging::{init_tracing, LogFormat};
use courier::services::tvmaze::EpisodeTitleSource;
use courier::services::{
    LibraryPaths, LibraryScanner, Organizer, PlexScanner, ServicesManager, TorrentService,
    TorrentServiceConfig, TvMazeClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);
    init_tracing(LogFormat::from_env());

    info!("Starting Courier");

    let torrent_service = Arc::new(TorrentService::new(TorrentServiceConfig {
        download_dir: config.downloads_path.clone(),
        session_dir: config.session_path.clone(),
        enable_dht: config.torrent_enable_dht,
        listen_port: config.torrent_listen_port,
        allowed_extensions: config.allowed_extensions.clone(),
    }));

    let titles: Option<Arc<dyn EpisodeTitleSource>> = if config.tvmaze_enabled {
        Some(Arc::new(TvMazeClient::new()))
    } else {
        None
    };
    let organizer = Organizer::new(LibraryPaths {
        default: config.default_save_path.clone(),
        movies: config.movies_save_path.clone(),
        tv: config.tv_shows_save_path.clone(),
    });
    let post = PostProcessor::new(organizer, titles, config.allowed_extensions.clone());

    let store = Arc::new(SnapshotStore::new(&config.persistence_file));
    let mut builder = DownloadManager::builder(torrent_service.clone(), post)
        .settings(ManagerSettings::from_config(&config))
        .store(store.clone());
    match config.plex.clone() {
        Some(plex) => {
            let scanner: Arc<dyn LibraryScanner> = Arc::new(PlexScanner::new(plex));
            builder = builder.scanner(scanner);
        }
        None => warn!("Plex is not configured, library scans are disabled"),
    }
    let downloads = builder.build();

    let mut sinks: Vec<Arc<dyn StatusSink>> = vec![Arc::new(LogSink)];
    if let Some(url) = &config.status_webhook_url {
        sinks.push(Arc::new(WebhookSink::new(url.clone())));
    }

    let services = Arc::new(ServicesManager::new());
    services.register(torrent_service).await;
    services
        .register(Arc::new(DownloadService::new(downloads.clone(), store, sinks)))
        .await;
    services.start_all().await.context("Failed to start services")?;

    let state = AppState {
        config: config.clone(),
        services: services.clone(),
        downloads,
    };
    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.host, config.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    services.stop_all().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
