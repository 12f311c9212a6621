//! librqbit glue: add options, identifiers, and status/file mapping.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use librqbit::{AddTorrentOptions, ManagedTorrent, TorrentStatsState};

use super::engine::{EngineFile, EngineState, EngineStatus, InfoHash};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct TorrentServiceConfig {
    pub download_dir: PathBuf,
    pub session_dir: PathBuf,
    pub enable_dht: bool,
    pub listen_port: u16,
    /// Only files with these extensions are downloaded.
    pub allowed_extensions: Vec<String>,
}

/// Options for every add: overwrite partial data, restrict to media files.
pub fn add_torrent_opts(allowed_extensions: &[String]) -> AddTorrentOptions {
    AddTorrentOptions {
        overwrite: true,
        only_files_regex: only_files_regex(allowed_extensions),
        ..Default::default()
    }
}

/// `(?i)\.(mkv|mp4)$` for [".mkv", ".mp4"]; `None` means "everything".
pub fn only_files_regex(allowed_extensions: &[String]) -> Option<String> {
    let alternatives: Vec<String> = allowed_extensions
        .iter()
        .map(|e| regex::escape(e.trim_start_matches('.')))
        .filter(|e| !e.is_empty())
        .collect();
    if alternatives.is_empty() {
        None
    } else {
        Some(format!(r"(?i)\.({})$", alternatives.join("|")))
    }
}

pub fn info_hash_of<T: AsRef<ManagedTorrent>>(handle: &T) -> InfoHash {
    InfoHash::from_bytes(&handle.as_ref().info_hash().0)
}

/// Map librqbit stats into the engine-neutral status.
pub fn status_of(handle: &Arc<ManagedTorrent>, download_dir: &Path) -> EngineStatus {
    let stats = handle.stats();
    let state = match &stats.state {
        TorrentStatsState::Paused => EngineState::Paused,
        TorrentStatsState::Error => EngineState::Error,
        TorrentStatsState::Live => EngineState::Live,
        TorrentStatsState::Initializing => EngineState::Initializing,
    };
    let (rate_bytes_per_sec, peers) = stats
        .live
        .as_ref()
        .map(|live| {
            let dl = (live.download_speed.mbps * 125000.0) as u64;
            (dl, live.snapshot.peer_stats.live)
        })
        .unwrap_or((0, 0));

    EngineStatus {
        state,
        bytes_done: stats.progress_bytes,
        total_bytes: stats.total_bytes,
        rate_bytes_per_sec,
        peers,
        finished: stats.finished,
        files: files_of(handle, download_dir),
    }
}

/// Files with their on-disk location.
///
/// Single-file torrents land directly in the download dir; multi-file ones in
/// a folder named after the torrent.
pub fn files_of(handle: &Arc<ManagedTorrent>, download_dir: &Path) -> Vec<EngineFile> {
    let Some(metadata) = handle.metadata.load_full() else {
        return Vec::new();
    };
    let single = metadata.file_infos.len() == 1;
    let torrent_name = handle.name().unwrap_or_else(|| "unknown".to_string());

    metadata
        .file_infos
        .iter()
        .enumerate()
        .map(|(index, file_info)| {
            let relative = file_info.relative_filename.to_string_lossy();
            let path = if single {
                download_dir.join(relative.as_ref())
            } else {
                download_dir.join(&torrent_name).join(relative.as_ref())
            };
            EngineFile {
                index,
                path,
                size: file_info.len,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_from_extensions() {
        let exts = vec![".mkv".to_string(), ".mp4".to_string()];
        let re = only_files_regex(&exts).unwrap();
        assert_eq!(re, r"(?i)\.(mkv|mp4)$");
        let compiled = regex::Regex::new(&re).unwrap();
        assert!(compiled.is_match("Show/S01E01.MKV"));
        assert!(!compiled.is_match("Show/readme.txt"));
    }

    #[test]
    fn no_extensions_means_no_filter() {
        assert_eq!(only_files_regex(&[]), None);
    }
}
