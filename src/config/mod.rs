//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Placeholder token shipped in sample env files; treated as "not configured".
const PLEX_TOKEN_PLACEHOLDER: &str = "PLEX_TOKEN";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address for the HTTP server
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory the torrent engine writes into
    pub downloads_path: PathBuf,

    /// Session/state directory path (for DHT, resume data)
    pub session_path: PathBuf,

    /// Library root used when no kind-specific root applies
    pub default_save_path: PathBuf,

    /// Library root for movies (falls back to the default root)
    pub movies_save_path: PathBuf,

    /// Library root for TV shows (falls back to the default root)
    pub tv_shows_save_path: PathBuf,

    /// Where the queue/active-job snapshot is kept
    pub persistence_file: PathBuf,

    /// Plex server, if library scans are wanted
    pub plex: Option<PlexConfig>,

    /// Enable DHT for torrent discovery
    pub torrent_enable_dht: bool,

    /// Listen port for incoming torrent connections (0 = random)
    pub torrent_listen_port: u16,

    /// Deadline for resolving a source's metadata
    pub metadata_timeout: Duration,

    /// Progress reporter tick
    pub progress_interval: Duration,

    /// Largest accepted torrent in bytes; `None` disables the check
    pub max_torrent_bytes: Option<u64>,

    /// Accepted media extensions, lowercase with leading dot
    pub allowed_extensions: Vec<String>,

    /// Size of the bounded pool used for blocking metadata work
    pub metadata_workers: usize,

    /// Optional endpoint that receives every status event as JSON
    pub status_webhook_url: Option<String>,

    /// Look up episode titles on TVMaze when naming files
    pub tvmaze_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct PlexConfig {
    pub url: String,
    pub token: String,
    pub movies_section: String,
    pub tv_section: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let default_save_path =
            PathBuf::from(env::var("DEFAULT_SAVE_PATH").unwrap_or_else(|_| "./data/library".to_string()));

        let movies_save_path = env::var("MOVIES_SAVE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_save_path.clone());
        let tv_shows_save_path = env::var("TV_SHOWS_SAVE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_save_path.clone());

        let plex = match (env::var("PLEX_URL").ok(), env::var("PLEX_TOKEN").ok()) {
            (Some(url), Some(token)) if !url.is_empty() && is_real_token(&token) => Some(PlexConfig {
                url: url.trim_end_matches('/').to_string(),
                token,
                movies_section: env::var("PLEX_MOVIES_SECTION").unwrap_or_else(|_| "Movies".to_string()),
                tv_section: env::var("PLEX_TV_SECTION").unwrap_or_else(|_| "TV Shows".to_string()),
            }),
            _ => None,
        };

        let max_gb: u64 = parse_var("MAX_TORRENT_SIZE_GB", 21)?;

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: parse_var("PORT", 3001)?,

            downloads_path: PathBuf::from(
                env::var("DOWNLOADS_PATH").unwrap_or_else(|_| "./data/downloads".to_string()),
            ),

            session_path: PathBuf::from(
                env::var("SESSION_PATH").unwrap_or_else(|_| "./data/session".to_string()),
            ),

            default_save_path,
            movies_save_path,
            tv_shows_save_path,

            persistence_file: PathBuf::from(
                env::var("PERSISTENCE_FILE").unwrap_or_else(|_| "./data/persistence.json".to_string()),
            ),

            plex,

            torrent_enable_dht: env::var("TORRENT_ENABLE_DHT")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),

            torrent_listen_port: parse_var("TORRENT_LISTEN_PORT", 0)?,

            metadata_timeout: Duration::from_secs(parse_var("METADATA_TIMEOUT_SECS", 60)?),

            progress_interval: Duration::from_secs(parse_var("PROGRESS_INTERVAL_SECS", 5)?.max(1)),

            max_torrent_bytes: (max_gb > 0).then(|| max_gb * 1024 * 1024 * 1024),

            allowed_extensions: parse_extensions(
                &env::var("ALLOWED_EXTENSIONS").unwrap_or_else(|_| ".mkv,.mp4".to_string()),
            ),

            metadata_workers: parse_var::<usize>("METADATA_WORKERS", 2)?.max(1),

            status_webhook_url: env::var("STATUS_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),

            tvmaze_enabled: env::var("TVMAZE_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

fn is_real_token(token: &str) -> bool {
    !token.is_empty() && token != PLEX_TOKEN_PLACEHOLDER
}

/// Normalize a comma separated extension list to lowercase ".ext" entries.
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .collect()
}
