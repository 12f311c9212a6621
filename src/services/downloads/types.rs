//! Job data model: descriptors, phases, and the per-job mutable state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::filename_parser::{parse_release_name, MediaKind, ParsedInfo};
use crate::services::torrent::InfoHash;

/// Chat or user scope under which jobs are queued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Reference to the chat message that renders a job's status. Opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

/// Where a job's content comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Magnet { uri: String },
    Url { url: String },
    /// A `.torrent` file on local disk, removed once the job ends.
    File { path: PathBuf },
}

impl Source {
    /// Content identifier known before any fetch (magnets only).
    pub fn known_info_hash(&self) -> Option<InfoHash> {
        match self {
            Source::Magnet { uri } => InfoHash::from_magnet(uri),
            Source::Url { .. } | Source::File { .. } => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Magnet { uri } => match InfoHash::from_magnet(uri) {
                Some(hash) => write!(f, "magnet:{}", hash),
                None => f.write_str("magnet"),
            },
            Source::Url { url } => f.write_str(url),
            Source::File { path } => write!(f, "file:{}", path.display()),
        }
    }
}

/// An accepted download request. Never mutated after admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub source: Source,
    pub owner: OwnerId,
    /// Release name as offered to the user.
    pub name: String,
    pub parsed_info: ParsedInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_message: Option<MessageRef>,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
}

impl JobDescriptor {
    /// Descriptor with metadata parsed from `name`.
    pub fn new(source: Source, owner: OwnerId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            parsed_info: parse_release_name(&name),
            source,
            owner,
            name,
            origin_message: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_parsed_info(mut self, parsed_info: ParsedInfo) -> Self {
        self.parsed_info = parsed_info;
        self
    }

    pub fn with_origin_message(mut self, message: MessageRef) -> Self {
        self.origin_message = Some(message);
        self
    }

    pub fn media_kind(&self) -> MediaKind {
        self.parsed_info.kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Queued,
    FetchingMetadata,
    Transferring,
    Paused,
    Completing,
    Done,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed | Phase::Cancelled)
    }

    /// Phases the progress reporter renders.
    pub fn is_reportable(self) -> bool {
        matches!(self, Phase::Transferring | Phase::Paused)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Queued => "queued",
            Phase::FetchingMetadata => "fetching metadata",
            Phase::Transferring => "transferring",
            Phase::Paused => "paused",
            Phase::Completing => "completing",
            Phase::Done => "done",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Mutable state of one admitted job. The engine handle is held by the job
/// task, never here, so this is always serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub id: JobId,
    pub descriptor: JobDescriptor,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<InfoHash>,
    #[serde(default)]
    pub cancellation_pending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admitted_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn new(id: JobId, descriptor: JobDescriptor) -> Self {
        Self {
            id,
            descriptor,
            phase: Phase::Queued,
            info_hash: None,
            cancellation_pending: false,
            admitted_at: None,
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.descriptor.owner
    }

    pub fn is_paused(&self) -> bool {
        self.phase == Phase::Paused
    }
}

/// Result counts for a season pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackSummary {
    pub processed: usize,
    pub skipped: usize,
}

/// Durable form of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    #[serde(default)]
    pub active_jobs: BTreeMap<JobId, JobState>,
    #[serde(default)]
    pub queues: BTreeMap<OwnerId, Vec<JobDescriptor>>,
}

impl PersistedSnapshot {
    pub fn is_empty(&self) -> bool {
        self.active_jobs.is_empty() && self.queues.values().all(Vec::is_empty)
    }
}

/// Reply to a pause/resume request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Paused,
    Resumed,
    /// Already in the requested state; no engine call was made.
    Unchanged,
}

/// Reply to an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enqueued {
    /// Admitted right away.
    Admitted { job_id: JobId },
    /// Waiting behind the owner's active job; `position` counts from 1.
    Waiting { position: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_name() {
        let d = JobDescriptor::new(
            Source::Url { url: "https://example.org/a.torrent".into() },
            OwnerId::new("42"),
            "The.Expanse.S02.1080p",
        );
        assert!(d.parsed_info.is_season_pack);
        assert_eq!(d.media_kind(), MediaKind::Episode);
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Done.is_terminal());
        assert!(Phase::Failed.is_terminal());
        assert!(Phase::Cancelled.is_terminal());
        assert!(!Phase::Paused.is_terminal());
        assert!(Phase::Paused.is_reportable());
        assert!(!Phase::Completing.is_reportable());
    }

    #[test]
    fn source_serializes_with_kind_tag() {
        let json = serde_json::to_value(Source::Magnet { uri: "magnet:?xt=x".into() }).unwrap();
        assert_eq!(json["kind"], "magnet");
    }
}
