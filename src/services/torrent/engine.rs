//! The transfer engine as seen by the download lifecycle.
//!
//! The lifecycle code only talks to [TransferEngine]; the librqbit session in
//! [super::service] is one implementation and tests use an in-memory one.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The engine's content identifier: a v1 info hash as 40 lowercase hex chars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash(String);

impl InfoHash {
    /// Accepts 40 hex chars or the 32 char base32 form used by some magnets.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() == 40 && raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Some(Self(raw.to_ascii_lowercase()));
        }
        if raw.len() == 32 {
            return decode_base32(raw).map(|bytes| Self::from_bytes(&bytes));
        }
        None
    }

    pub fn from_bytes(bytes: &[u8; 20]) -> Self {
        Self(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// Extract the `xt=urn:btih:` hash from a magnet URI.
    pub fn from_magnet(uri: &str) -> Option<Self> {
        let parsed = url::Url::parse(uri).ok()?;
        if parsed.scheme() != "magnet" {
            return None;
        }
        parsed
            .query_pairs()
            .filter(|(k, _)| k == "xt")
            .find_map(|(_, v)| {
                v.strip_prefix("urn:btih:")
                    .or_else(|| v.strip_prefix("urn:BTIH:"))
                    .and_then(Self::parse)
            })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InfoHash {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid info hash: {}", value))
    }
}

impl From<InfoHash> for String {
    fn from(value: InfoHash) -> Self {
        value.0
    }
}

fn decode_base32(raw: &str) -> Option<[u8; 20]> {
    let mut out = [0u8; 20];
    let mut buffer: u64 = 0;
    let mut bits = 0;
    let mut idx = 0;
    for c in raw.chars() {
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u64 - 'A' as u64,
            c @ '2'..='7' => c as u64 - '2' as u64 + 26,
            _ => return None,
        };
        buffer = ((buffer << 5) | value) & 0xffff;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *out.get_mut(idx)? = (buffer >> bits) as u8;
            idx += 1;
        }
    }
    (idx == 20).then_some(out)
}

/// A source the engine can accept directly.
#[derive(Debug, Clone)]
pub enum ResolvedSource {
    Magnet(String),
    Url(String),
    /// Raw `.torrent` bytes.
    Bytes(Vec<u8>),
}

/// Coarse engine state for one torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Initializing,
    Live,
    Paused,
    Error,
}

/// One file of a torrent, as laid out on disk by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFile {
    pub index: usize,
    /// Absolute path where the engine writes this file.
    pub path: PathBuf,
    pub size: u64,
}

/// A status poll result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub bytes_done: u64,
    pub total_bytes: u64,
    pub rate_bytes_per_sec: u64,
    pub peers: usize,
    pub finished: bool,
    pub files: Vec<EngineFile>,
}

impl EngineStatus {
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),
    #[error("torrent {0} is not managed by the engine")]
    NotFound(InfoHash),
    #[error("engine rejected the source: {0}")]
    Rejected(String),
}

/// Handle-based primitives of a peer-to-peer transfer engine.
///
/// `submit` returns once the engine knows the torrent's metadata, which for
/// magnets means after it has been fetched from peers.
#[async_trait]
pub trait TransferEngine: Send + Sync + 'static {
    async fn submit(&self, source: &ResolvedSource) -> Result<InfoHash, EngineError>;

    async fn pause(&self, hash: &InfoHash) -> Result<(), EngineError>;

    async fn resume(&self, hash: &InfoHash) -> Result<(), EngineError>;

    async fn remove(&self, hash: &InfoHash, delete_data: bool) -> Result<(), EngineError>;

    async fn status(&self, hash: &InfoHash) -> Result<EngineStatus, EngineError>;

    /// Whether the engine still manages this torrent (used to re-attach after restart).
    async fn contains(&self, hash: &InfoHash) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    #[test]
    fn parses_hex_magnet() {
        let uri = format!("magnet:?xt=urn:btih:{}&dn=Some.Show.S01E01", HEX.to_uppercase());
        assert_eq!(InfoHash::from_magnet(&uri).unwrap().as_str(), HEX);
    }

    #[test]
    fn parses_base32_magnet() {
        // base32 of the same 20 bytes
        let uri = "magnet:?xt=urn:btih:YEX6DQDLXISUVHOJ6UM3GNNKPQJWPKEK&dn=x";
        assert_eq!(InfoHash::from_magnet(uri).unwrap().as_str(), HEX);
    }

    #[test]
    fn rejects_non_magnets() {
        assert!(InfoHash::from_magnet("https://example.org/file.torrent").is_none());
        assert!(InfoHash::parse("abc").is_none());
    }

    #[test]
    fn percent_handles_unknown_size() {
        let status = EngineStatus {
            state: EngineState::Initializing,
            bytes_done: 0,
            total_bytes: 0,
            rate_bytes_per_sec: 0,
            peers: 0,
            finished: false,
            files: vec![],
        };
        assert_eq!(status.percent(), 0.0);
    }
}
