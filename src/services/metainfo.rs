//! Torrent metainfo parsing utilities
//!
//! Decodes `.torrent` files far enough to list their files and total size
//! without handing them to the engine. Used for uploaded files, whose bytes
//! are read and checked on the blocking pool before submission.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Information about a file within a torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetainfoFile {
    /// Relative path within the torrent
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

/// Decoded view of a metainfo file.
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub name: String,
    pub files: Vec<MetainfoFile>,
}

impl Metainfo {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetainfoError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("not a valid torrent file: {0}")]
    Decode(String),
    #[error("torrent lists no files")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    length: u64,
    #[serde(default)]
    path: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    name: String,
    #[serde(default)]
    length: Option<u64>,
    #[serde(default)]
    files: Option<Vec<RawFile>>,
}

#[derive(Debug, Deserialize)]
struct RawTorrent {
    info: RawInfo,
}

/// Decode raw `.torrent` bytes.
pub fn decode(bytes: &[u8]) -> Result<Metainfo, MetainfoError> {
    let torrent: RawTorrent =
        serde_bencode::from_bytes(bytes).map_err(|e| MetainfoError::Decode(e.to_string()))?;

    let files = match (torrent.info.files, torrent.info.length) {
        (Some(files), _) => files
            .into_iter()
            .map(|f| MetainfoFile {
                path: f.path.iter().collect(),
                size: f.length,
            })
            .collect(),
        (None, Some(length)) => vec![MetainfoFile {
            path: PathBuf::from(&torrent.info.name),
            size: length,
        }],
        (None, None) => Vec::new(),
    };

    if files.is_empty() {
        return Err(MetainfoError::Empty);
    }

    Ok(Metainfo {
        name: torrent.info.name,
        files,
    })
}

/// Read and decode a `.torrent` from disk. Blocking; run it on the pool.
pub fn read_file(path: &Path) -> Result<(Vec<u8>, Metainfo), MetainfoError> {
    let bytes = std::fs::read(path).map_err(|source| MetainfoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let info = decode(&bytes)?;
    Ok((bytes, info))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-assembled bencode for a multi-file torrent.
    pub(crate) fn multi_file_torrent(name: &str, files: &[(&str, u64)]) -> Vec<u8> {
        let mut out = String::from("d4:infod5:filesl");
        for (path, len) in files {
            out.push_str(&format!("d6:lengthi{}e4:pathl{}:{}ee", len, path.len(), path));
        }
        out.push_str(&format!("e4:name{}:{}12:piece lengthi16384eee", name.len(), name));
        out.into_bytes()
    }

    #[test]
    fn decodes_multi_file() {
        let bytes = multi_file_torrent("Show.S01", &[("e01.mkv", 100), ("e02.mkv", 200)]);
        let info = decode(&bytes).unwrap();
        assert_eq!(info.name, "Show.S01");
        assert_eq!(info.files.len(), 2);
        assert_eq!(info.files[1].path, PathBuf::from("e02.mkv"));
        assert_eq!(info.total_size(), 300);
    }

    #[test]
    fn decodes_single_file() {
        let bytes = b"d4:infod6:lengthi42e4:name9:movie.mp412:piece lengthi16384eee";
        let info = decode(bytes).unwrap();
        assert_eq!(info.files, vec![MetainfoFile { path: PathBuf::from("movie.mp4"), size: 42 }]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode(b"not bencode"), Err(MetainfoError::Decode(_))));
    }

    #[test]
    fn read_file_reports_missing_path() {
        let err = read_file(Path::new("/definitely/not/here.torrent")).unwrap_err();
        assert!(matches!(err, MetainfoError::Read { .. }));
    }
}
