//! Download lifecycle: per-owner queues, job state machine, progress
//! reporting, season-pack post-processing, and snapshot persistence.

mod error;
mod job;
pub mod notify;
pub mod postprocess;
pub mod registry;
mod reporter;
pub mod service;
pub mod store;
pub mod types;

pub use error::DownloadError;
pub use notify::{
    spawn_sink, JobOutcome, LogSink, Notifier, ProgressAction, ProgressPayload, StatusEvent,
    StatusSink, WebhookSink,
};
pub use postprocess::{is_media_file, PostProcessReport, PostProcessor};
pub use registry::{DownloadManager, DownloadManagerBuilder, ManagerSettings, ReportOutcome};
pub use service::DownloadService;
pub use store::{SnapshotStore, SnapshotWriter};
pub use types::{
    Enqueued, JobDescriptor, JobId, JobState, MessageRef, OwnerId, PackSummary, PersistedSnapshot,
    Phase, Source, ToggleOutcome,
};
