//! Services and their collaborators

pub mod downloads;
pub mod filename_parser;
pub mod job_queue;
pub mod logging;
pub mod manager;
pub mod metainfo;
pub mod organizer;
pub mod plex;
pub mod torrent;
pub mod tvmaze;

pub use downloads::{DownloadManager, DownloadService};
pub use manager::{HealthStatus, Service, ServiceHealth, ServicesManager};
pub use organizer::{LibraryPaths, Organizer};
pub use plex::{LibraryScanner, PlexScanner};
pub use torrent::{TorrentService, TorrentServiceConfig};
pub use tvmaze::{EpisodeTitleSource, TvMazeClient};
