use std::path::PathBuf;
use std::time::Duration;

use crate::services::job_queue::PoolError;
use crate::services::metainfo::MetainfoError;
use crate::services::torrent::EngineError;

use super::types::Phase;

/// Failures of the download lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("metadata was not resolved within {}s", .0.as_secs())]
    MetadataTimeout(Duration),

    #[error("transfer engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not derive media metadata from {0}")]
    UnparseableMetadata(String),

    #[error("snapshot at {path} is unreadable: {reason}")]
    SnapshotCorrupt { path: PathBuf, reason: String },

    #[error("rejected: {0}")]
    Validation(String),

    #[error("could not load source: {0}")]
    SourceFetch(String),

    #[error("no file of the season pack could be placed ({skipped} skipped)")]
    EmptyPack { skipped: usize },

    #[error("job {0} not found")]
    NotFound(String),

    #[error("cannot {action} while {phase}")]
    InvalidState { phase: Phase, action: &'static str },

    #[error("post-processing was interrupted")]
    Interrupted,

    #[error("download manager is shutting down")]
    ShuttingDown,
}

impl From<EngineError> for DownloadError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(msg) => DownloadError::EngineUnavailable(msg),
            EngineError::NotFound(hash) => {
                DownloadError::EngineUnavailable(format!("torrent {} is gone from the engine", hash))
            }
            EngineError::Rejected(msg) => DownloadError::SourceFetch(msg),
        }
    }
}

impl From<MetainfoError> for DownloadError {
    fn from(err: MetainfoError) -> Self {
        DownloadError::SourceFetch(err.to_string())
    }
}

impl From<PoolError> for DownloadError {
    fn from(err: PoolError) -> Self {
        DownloadError::SourceFetch(err.to_string())
    }
}
