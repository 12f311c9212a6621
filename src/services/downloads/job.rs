//! One task per admitted job, driving it through its phases.
//!
//! The task is the only owner of the job's engine handle. User actions reach
//! it as [JobCommand]s; the registry keeps the observable [JobState] and is
//! updated through the manager, never held across an await here.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::DownloadError;
use super::notify::JobOutcome;
use super::postprocess::is_media_file;
use super::registry::DownloadManager;
use super::reporter;
use super::types::{JobDescriptor, JobId, Phase, Source, ToggleOutcome};
use crate::services::job_queue::BlockingPool;
use crate::services::metainfo;
use crate::services::torrent::{
    EngineError, EngineFile, EngineStatus, InfoHash, ResolvedSource, TransferEngine,
};

pub(crate) type PauseReply = oneshot::Sender<Result<ToggleOutcome, DownloadError>>;

#[derive(Debug)]
pub(crate) enum JobCommand {
    SetPaused { paused: bool, reply: PauseReply },
    /// Flip the pause state as the task currently sees it.
    Toggle { reply: PauseReply },
    /// Confirmed cancellation.
    Cancel,
    /// Process is stopping: let go of the engine without removing anything.
    Shutdown,
}

/// How the task begins.
#[derive(Debug)]
pub(crate) enum Start {
    Fresh,
    /// The engine still manages this torrent from a previous run.
    Reattach(InfoHash),
}

/// Exclusive handle on one torrent inside the engine.
///
/// Consumed by [EngineHandle::release] or [EngineHandle::detach], so the
/// engine resource is let go of exactly once.
pub(crate) struct EngineHandle {
    engine: Arc<dyn TransferEngine>,
    hash: InfoHash,
}

impl EngineHandle {
    fn new(engine: Arc<dyn TransferEngine>, hash: InfoHash) -> Self {
        Self { engine, hash }
    }

    pub(crate) fn hash(&self) -> &InfoHash {
        &self.hash
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.engine.pause(&self.hash).await
    }

    async fn resume(&self) -> Result<(), EngineError> {
        self.engine.resume(&self.hash).await
    }

    async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.engine.status(&self.hash).await
    }

    /// Read-only view for the progress reporter.
    pub(crate) fn probe(&self) -> StatusProbe {
        StatusProbe {
            engine: self.engine.clone(),
            hash: self.hash.clone(),
        }
    }

    /// Remove the torrent from the engine. Consumes the handle even when the
    /// engine refuses, so removal is attempted once.
    async fn release(self, delete_data: bool) -> Result<(), EngineError> {
        self.engine.remove(&self.hash, delete_data).await?;
        debug!(info_hash = %self.hash, delete_data, "Released torrent");
        Ok(())
    }

    /// Leave the torrent in the engine so a later run can re-attach.
    fn detach(self) -> InfoHash {
        self.hash
    }
}

/// Status-only access to a job's torrent.
#[derive(Clone)]
pub(crate) struct StatusProbe {
    engine: Arc<dyn TransferEngine>,
    hash: InfoHash,
}

impl StatusProbe {
    pub(crate) async fn status(&self) -> Result<EngineStatus, EngineError> {
        self.engine.status(&self.hash).await
    }

    pub(crate) fn hash(&self) -> &InfoHash {
        &self.hash
    }
}

/// Why a phase stopped early.
enum Stop {
    Cancelled,
    Failed { error: DownloadError, delete_data: bool },
    Detached,
}

impl Stop {
    fn failed(error: DownloadError) -> Self {
        Stop::Failed { error, delete_data: true }
    }
}

enum Exit {
    Finished(JobOutcome),
    Detached,
}

pub(crate) struct JobRunner {
    id: JobId,
    descriptor: JobDescriptor,
    manager: DownloadManager,
    commands: mpsc::UnboundedReceiver<JobCommand>,
}

impl JobRunner {
    pub(crate) fn new(
        id: JobId,
        descriptor: JobDescriptor,
        manager: DownloadManager,
        commands: mpsc::UnboundedReceiver<JobCommand>,
    ) -> Self {
        Self {
            id,
            descriptor,
            manager,
            commands,
        }
    }

    pub(crate) async fn run(mut self, start: Start) {
        info!(job_id = %self.id, owner = %self.descriptor.owner, source = %self.descriptor.source, "Job started");
        match self.drive(start).await {
            Exit::Finished(outcome) => {
                if let Source::File { path } = &self.descriptor.source {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        debug!(path = %path.display(), error = %e, "Could not remove torrent file");
                    }
                }
                match &outcome {
                    JobOutcome::Failed { error } => error!(job_id = %self.id, error = %error, "Job failed"),
                    other => info!(job_id = %self.id, outcome = ?other, "Job ended"),
                }
                self.manager.finish(self.id, outcome);
            }
            Exit::Detached => debug!(job_id = %self.id, "Job detached"),
        }
    }

    async fn drive(&mut self, start: Start) -> Exit {
        let handle = match start {
            Start::Reattach(hash) => {
                let handle = EngineHandle::new(self.manager.engine().clone(), hash);
                if let Err(e) = handle.resume().await {
                    warn!(job_id = %self.id, error = %e, "Could not resume re-attached torrent");
                }
                handle
            }
            Start::Fresh => match self.fetch().await {
                Ok(handle) => handle,
                Err(stop) => return self.stop_without_handle(stop),
            },
        };

        let files = match self.transfer(&handle).await {
            Ok(files) => files,
            Err(stop) => return self.stop(handle, stop).await,
        };

        self.complete(handle, files).await
    }

    fn stop_without_handle(&self, stop: Stop) -> Exit {
        match stop {
            Stop::Cancelled => Exit::Finished(JobOutcome::Cancelled),
            Stop::Failed { error, .. } => Exit::Finished(JobOutcome::Failed {
                error: error.to_string(),
            }),
            Stop::Detached => Exit::Detached,
        }
    }

    async fn stop(&self, handle: EngineHandle, stop: Stop) -> Exit {
        match stop {
            Stop::Cancelled => match handle.release(true).await {
                Ok(()) => Exit::Finished(JobOutcome::Cancelled),
                Err(e) => self.release_failed(e),
            },
            Stop::Failed { error, delete_data } => {
                if let Err(e) = handle.release(delete_data).await {
                    warn!(job_id = %self.id, error = %e, "Failed to remove torrent from engine");
                }
                Exit::Finished(JobOutcome::Failed {
                    error: error.to_string(),
                })
            }
            Stop::Detached => {
                let hash = handle.detach();
                debug!(job_id = %self.id, info_hash = %hash, "Leaving torrent in engine");
                Exit::Detached
            }
        }
    }

    /// A refused removal may leave partial data behind, so the job fails.
    fn release_failed(&self, e: EngineError) -> Exit {
        error!(job_id = %self.id, error = %e, "Failed to remove torrent from engine");
        Exit::Finished(JobOutcome::Failed {
            error: DownloadError::from(e).to_string(),
        })
    }

    /// Best-effort removal of a torrent the engine may never have added.
    async fn release_known(&self, engine: &Arc<dyn TransferEngine>, hash: Option<&InfoHash>) {
        let Some(hash) = hash else {
            return;
        };
        match EngineHandle::new(engine.clone(), hash.clone()).release(true).await {
            Ok(()) | Err(EngineError::NotFound(_)) => {}
            Err(e) => warn!(job_id = %self.id, info_hash = %hash, error = %e, "Failed to remove torrent from engine"),
        }
    }

    /// FetchingMetadata: resolve the source and hand it to the engine, bounded
    /// by the metadata deadline.
    async fn fetch(&mut self) -> Result<EngineHandle, Stop> {
        let engine = self.manager.engine().clone();
        let timeout = self.manager.settings().metadata_timeout;
        let known_hash = self.descriptor.source.known_info_hash();

        let submit = {
            let engine = engine.clone();
            let pool = self.manager.pool().clone();
            let source = self.descriptor.source.clone();
            async move {
                let resolved = resolve_source(&pool, &source).await?;
                Ok::<_, DownloadError>(engine.submit(&resolved).await?)
            }
        };
        tokio::pin!(submit);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let hash = loop {
            tokio::select! {
                result = &mut submit => match result {
                    Ok(hash) => break hash,
                    Err(e) => return Err(Stop::failed(e)),
                },
                _ = &mut deadline => {
                    warn!(job_id = %self.id, timeout_secs = timeout.as_secs(), "Metadata fetch timed out");
                    self.release_known(&engine, known_hash.as_ref()).await;
                    return Err(Stop::failed(DownloadError::MetadataTimeout(timeout)));
                }
                command = self.commands.recv() => match command {
                    Some(JobCommand::Cancel) => {
                        self.release_known(&engine, known_hash.as_ref()).await;
                        return Err(Stop::Cancelled);
                    }
                    Some(JobCommand::SetPaused { reply, .. } | JobCommand::Toggle { reply }) => {
                        let _ = reply.send(Err(DownloadError::InvalidState {
                            phase: Phase::FetchingMetadata,
                            action: "pause",
                        }));
                    }
                    Some(JobCommand::Shutdown) | None => return Err(Stop::Detached),
                },
            }
        };

        info!(job_id = %self.id, info_hash = %hash, "Metadata resolved");
        self.manager.set_info_hash(self.id, hash.clone());
        let handle = EngineHandle::new(engine, hash);

        match handle.status().await {
            Ok(status) => {
                if let Err(e) = self.validate(&status) {
                    if let Err(release) = handle.release(true).await {
                        warn!(job_id = %self.id, error = %release, "Failed to remove rejected torrent");
                    }
                    return Err(Stop::failed(e));
                }
            }
            Err(e) => warn!(job_id = %self.id, error = %e, "Could not validate torrent, continuing"),
        }
        Ok(handle)
    }

    fn validate(&self, status: &EngineStatus) -> Result<(), DownloadError> {
        let settings = self.manager.settings();
        if let Some(max) = settings.max_total_bytes
            && status.total_bytes > max
        {
            return Err(DownloadError::Validation(format!(
                "{} is {} bytes, the limit is {}",
                self.descriptor.name, status.total_bytes, max
            )));
        }
        if !status.files.is_empty()
            && !status
                .files
                .iter()
                .any(|f| is_media_file(&f.path, &settings.allowed_extensions))
        {
            return Err(DownloadError::Validation(format!(
                "{} contains no {} file",
                self.descriptor.name,
                settings.allowed_extensions.join("/")
            )));
        }
        Ok(())
    }

    /// Transferring/Paused until the reporter sees the transfer finish.
    async fn transfer(&mut self, handle: &EngineHandle) -> Result<Vec<EngineFile>, Stop> {
        self.manager.set_phase(self.id, Phase::Transferring);
        let mut paused = false;

        let stop_reporter = CancellationToken::new();
        let _stop_guard = stop_reporter.clone().drop_guard();
        let (done_tx, mut done_rx) = oneshot::channel();
        self.manager.tasks().spawn(reporter::run(
            self.manager.clone(),
            self.id,
            handle.probe(),
            self.manager.settings().progress_interval,
            done_tx,
            stop_reporter,
        ));

        loop {
            tokio::select! {
                files = &mut done_rx => return match files {
                    Ok(files) => Ok(files),
                    Err(_) => Err(Stop::Detached),
                },
                command = self.commands.recv() => match command {
                    Some(JobCommand::SetPaused { paused: wanted, reply }) => {
                        let result = self.set_paused(handle, &mut paused, wanted).await;
                        let _ = reply.send(result);
                    }
                    Some(JobCommand::Toggle { reply }) => {
                        let wanted = !paused;
                        let result = self.set_paused(handle, &mut paused, wanted).await;
                        let _ = reply.send(result);
                    }
                    Some(JobCommand::Cancel) => return Err(Stop::Cancelled),
                    Some(JobCommand::Shutdown) | None => return Err(Stop::Detached),
                },
            }
        }
    }

    async fn set_paused(
        &self,
        handle: &EngineHandle,
        paused: &mut bool,
        wanted: bool,
    ) -> Result<ToggleOutcome, DownloadError> {
        if *paused == wanted {
            return Ok(ToggleOutcome::Unchanged);
        }
        if wanted {
            handle.pause().await?;
        } else {
            handle.resume().await?;
        }
        *paused = wanted;
        let (phase, outcome) = if wanted {
            (Phase::Paused, ToggleOutcome::Paused)
        } else {
            (Phase::Transferring, ToggleOutcome::Resumed)
        };
        self.manager.set_phase(self.id, phase);
        info!(job_id = %self.id, info_hash = %handle.hash(), ?outcome, "Toggled transfer");
        Ok(outcome)
    }

    /// Completing: post-process, then release the torrent.
    async fn complete(&mut self, handle: EngineHandle, files: Vec<EngineFile>) -> Exit {
        self.manager.set_phase(self.id, Phase::Completing);

        let post = self.manager.post_processor().clone();
        let descriptor = self.descriptor.clone();
        let interrupt = CancellationToken::new();
        let work = post.run(&descriptor, &files, &interrupt);
        tokio::pin!(work);

        let mut detach = false;
        let result = loop {
            tokio::select! {
                result = &mut work => break result,
                command = self.commands.recv() => match command {
                    Some(JobCommand::Cancel) => interrupt.cancel(),
                    Some(JobCommand::SetPaused { reply, .. } | JobCommand::Toggle { reply }) => {
                        let _ = reply.send(Err(DownloadError::InvalidState {
                            phase: Phase::Completing,
                            action: "pause",
                        }));
                    }
                    Some(JobCommand::Shutdown) | None => {
                        detach = true;
                        interrupt.cancel();
                    }
                },
            }
        };

        match result {
            Ok(report) => {
                // files are already in the library either way
                self.manager.spawn_scan(report.kind);
                match handle.release(true).await {
                    Ok(()) => Exit::Finished(JobOutcome::Done {
                        summary: report.summary,
                    }),
                    Err(e) => self.release_failed(e),
                }
            }
            Err(DownloadError::Interrupted) if detach => self.stop(handle, Stop::Detached).await,
            Err(DownloadError::Interrupted) => self.stop(handle, Stop::Cancelled).await,
            Err(error) => {
                self.stop(
                    handle,
                    Stop::Failed {
                        error,
                        delete_data: false,
                    },
                )
                .await
            }
        }
    }
}

/// Turn a job source into something the engine accepts. Torrent files are
/// read and checked on the blocking pool.
async fn resolve_source(pool: &BlockingPool, source: &Source) -> Result<ResolvedSource, DownloadError> {
    match source {
        Source::Magnet { uri } => Ok(ResolvedSource::Magnet(uri.clone())),
        Source::Url { url } => Ok(ResolvedSource::Url(url.clone())),
        Source::File { path } => {
            let path = path.clone();
            let (bytes, info) = pool.run(move || metainfo::read_file(&path)).await??;
            debug!(name = %info.name, files = info.files.len(), size = info.total_size(), "Decoded torrent file");
            Ok(ResolvedSource::Bytes(bytes))
        }
    }
}
