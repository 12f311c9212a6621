//! Status-change stream consumed by the chat transport.
//!
//! Events are published on a broadcast channel from inside the registry's
//! critical sections, so subscribers observe them in the order the state
//! changed. Sinks forward the stream somewhere else (logs, a webhook); a
//! failed delivery is logged and dropped.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{JobId, MessageRef, OwnerId, PackSummary, Phase};
use crate::services::torrent::InfoHash;

/// The control the UI should offer next to a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressAction {
    Pause,
    Resume,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressPayload {
    pub job_id: JobId,
    pub owner: OwnerId,
    pub info_hash: Option<InfoHash>,
    pub title: String,
    /// "Downloading" or "Paused".
    pub header: &'static str,
    pub percent: f64,
    pub state: String,
    pub peers: usize,
    /// Zero while paused.
    pub rate_bytes_per_sec: u64,
    pub action: ProgressAction,
    /// Offer "cancel all" (the owner has queued entries).
    pub show_cancel_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_message: Option<MessageRef>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    Done {
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<PackSummary>,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl JobOutcome {
    pub fn phase(&self) -> Phase {
        match self {
            JobOutcome::Done { .. } => Phase::Done,
            JobOutcome::Failed { .. } => Phase::Failed,
            JobOutcome::Cancelled => Phase::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    Queued {
        owner: OwnerId,
        name: String,
        position: usize,
    },
    PhaseChanged {
        job_id: JobId,
        owner: OwnerId,
        phase: Phase,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin_message: Option<MessageRef>,
    },
    Progress(ProgressPayload),
    CancelPrompt {
        job_id: JobId,
        owner: OwnerId,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin_message: Option<MessageRef>,
    },
    CancelDeclined {
        job_id: JobId,
        owner: OwnerId,
    },
    CancelAllPrompt {
        owner: OwnerId,
        active_job: Option<JobId>,
        queued: usize,
    },
    CancelAllDeclined {
        owner: OwnerId,
    },
    QueueCleared {
        owner: OwnerId,
        discarded: usize,
    },
    /// Exactly one per job that reaches a terminal phase.
    Finished {
        job_id: JobId,
        owner: OwnerId,
        name: String,
        outcome: JobOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        origin_message: Option<MessageRef>,
    },
}

impl StatusEvent {
    pub fn owner(&self) -> &OwnerId {
        match self {
            StatusEvent::Queued { owner, .. }
            | StatusEvent::PhaseChanged { owner, .. }
            | StatusEvent::CancelPrompt { owner, .. }
            | StatusEvent::CancelDeclined { owner, .. }
            | StatusEvent::CancelAllPrompt { owner, .. }
            | StatusEvent::CancelAllDeclined { owner }
            | StatusEvent::QueueCleared { owner, .. }
            | StatusEvent::Finished { owner, .. } => owner,
            StatusEvent::Progress(p) => &p.owner,
        }
    }
}

/// Publisher side of the status stream.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<StatusEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Never blocks; events are dropped when nobody listens.
    pub fn emit(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

/// A destination for status events.
#[async_trait]
pub trait StatusSink: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn deliver(&self, event: &StatusEvent) -> Result<()>;
}

/// Writes every event to the log.
pub struct LogSink;

#[async_trait]
impl StatusSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, event: &StatusEvent) -> Result<()> {
        match event {
            StatusEvent::Progress(p) => debug!(
                job_id = %p.job_id,
                percent = p.percent,
                peers = p.peers,
                rate = p.rate_bytes_per_sec,
                "{}", p.header
            ),
            StatusEvent::Finished { job_id, owner, outcome, .. } => {
                info!(job_id = %job_id, owner = %owner, outcome = ?outcome, "Job finished")
            }
            other => debug!(owner = %other.owner(), event = ?other, "Status event"),
        }
        Ok(())
    }
}

/// POSTs each event as JSON to a configured URL.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl StatusSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &StatusEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .context("Failed to post status event")?;
        if !response.status().is_success() {
            anyhow::bail!("Status webhook returned {}", response.status());
        }
        Ok(())
    }
}

/// Forward the stream into `sink` until `cancel` fires or the stream closes.
pub fn spawn_sink(
    notifier: &Notifier,
    sink: Arc<dyn StatusSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => received,
            };
            match event {
                Ok(event) => {
                    if let Err(e) = sink.deliver(&event).await {
                        warn!(sink = sink.name(), error = %e, "Status delivery failed");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(sink = sink.name(), skipped, "Status sink lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!(sink = sink.name(), "Status sink stopped");
    })
}
