//! The job registry and per-owner queue scheduler.
//!
//! All queue and job-state mutations happen inside short critical sections on
//! a synchronous mutex that is never held across an await. Check-then-act
//! sequences (admission, the reporter's cancellation guard, terminal
//! bookkeeping) therefore cannot interleave with each other, and status
//! events are emitted in the order the state changed.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::error::DownloadError;
use super::job::{JobCommand, JobRunner, Start};
use super::notify::{JobOutcome, Notifier, ProgressAction, ProgressPayload, StatusEvent};
use super::postprocess::PostProcessor;
use super::store::{SnapshotStore, SnapshotWriter};
use super::types::{
    Enqueued, JobDescriptor, JobId, JobState, OwnerId, PersistedSnapshot, Phase, ToggleOutcome,
};
use crate::config::Config;
use crate::services::filename_parser::MediaKind;
use crate::services::job_queue::BlockingPool;
use crate::services::plex::LibraryScanner;
use crate::services::torrent::{EngineStatus, InfoHash, TransferEngine};

/// Tunables of the lifecycle.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub metadata_timeout: Duration,
    pub progress_interval: Duration,
    /// `None` disables the size check.
    pub max_total_bytes: Option<u64>,
    pub allowed_extensions: Vec<String>,
    pub metadata_workers: usize,
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            metadata_timeout: config.metadata_timeout,
            progress_interval: config.progress_interval,
            max_total_bytes: config.max_torrent_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
            metadata_workers: config.metadata_workers,
        }
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_secs(5),
            max_total_bytes: Some(21 * 1024 * 1024 * 1024),
            allowed_extensions: vec![".mkv".to_string(), ".mp4".to_string()],
            metadata_workers: 2,
        }
    }
}

/// What happened to one progress report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent,
    /// A cancellation prompt is showing.
    Suppressed,
    /// The job is gone or not in a reportable phase.
    Skipped,
}

struct ActiveJob {
    state: JobState,
    commands: mpsc::UnboundedSender<JobCommand>,
}

#[derive(Default)]
struct Registry {
    accepting: bool,
    queues: HashMap<OwnerId, VecDeque<JobDescriptor>>,
    active: HashMap<JobId, ActiveJob>,
    by_owner: HashMap<OwnerId, JobId>,
    cancel_all_pending: HashSet<OwnerId>,
}

impl Registry {
    fn job(&self, id: JobId) -> Result<&ActiveJob, DownloadError> {
        self.active
            .get(&id)
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))
    }

    fn job_mut(&mut self, id: JobId) -> Result<&mut ActiveJob, DownloadError> {
        self.active
            .get_mut(&id)
            .ok_or_else(|| DownloadError::NotFound(id.to_string()))
    }

    fn queued(&self, owner: &OwnerId) -> usize {
        self.queues.get(owner).map_or(0, VecDeque::len)
    }

    fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            active_jobs: self
                .active
                .iter()
                .map(|(id, job)| (*id, job.state.clone()))
                .collect(),
            queues: self
                .queues
                .iter()
                .filter(|(_, q)| !q.is_empty())
                .map(|(owner, q)| (owner.clone(), q.iter().cloned().collect()))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

struct Inner {
    registry: Mutex<Registry>,
    engine: Arc<dyn TransferEngine>,
    settings: ManagerSettings,
    post: Arc<PostProcessor>,
    scanner: Option<Arc<dyn LibraryScanner>>,
    pool: BlockingPool,
    notifier: Notifier,
    store: Option<Arc<SnapshotStore>>,
    writer: Mutex<Option<(SnapshotWriter, JoinHandle<()>)>>,
    tasks: TaskTracker,
}

/// Entry point of the download lifecycle. Cheap to clone.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

pub struct DownloadManagerBuilder {
    engine: Arc<dyn TransferEngine>,
    post: PostProcessor,
    settings: ManagerSettings,
    scanner: Option<Arc<dyn LibraryScanner>>,
    store: Option<Arc<SnapshotStore>>,
    notifier: Option<Notifier>,
}

impl DownloadManagerBuilder {
    pub fn settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn scanner(mut self, scanner: Arc<dyn LibraryScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Must be called inside a Tokio runtime when a store is configured.
    pub fn build(self) -> DownloadManager {
        let writer = self
            .store
            .as_ref()
            .map(|store| SnapshotWriter::spawn(store.clone()));
        let pool = BlockingPool::new("metadata", self.settings.metadata_workers);
        DownloadManager {
            inner: Arc::new(Inner {
                registry: Mutex::new(Registry {
                    accepting: true,
                    ..Default::default()
                }),
                engine: self.engine,
                settings: self.settings,
                post: Arc::new(self.post),
                scanner: self.scanner,
                pool,
                notifier: self.notifier.unwrap_or_else(|| Notifier::new(1024)),
                store: self.store,
                writer: Mutex::new(writer),
                tasks: TaskTracker::new(),
            }),
        }
    }
}

impl DownloadManager {
    pub fn builder(engine: Arc<dyn TransferEngine>, post: PostProcessor) -> DownloadManagerBuilder {
        DownloadManagerBuilder {
            engine,
            post,
            settings: ManagerSettings::default(),
            scanner: None,
            store: None,
            notifier: None,
        }
    }

    // ---- accessors for job tasks ----

    pub(crate) fn engine(&self) -> &Arc<dyn TransferEngine> {
        &self.inner.engine
    }

    pub(crate) fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub(crate) fn post_processor(&self) -> &Arc<PostProcessor> {
        &self.inner.post
    }

    pub(crate) fn pool(&self) -> &BlockingPool {
        &self.inner.pool
    }

    pub(crate) fn tasks(&self) -> &TaskTracker {
        &self.inner.tasks
    }

    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Subscribe to status events.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.inner.notifier.subscribe()
    }

    // ---- queue scheduler ----

    /// Append to the owner's queue, admitting right away when the owner is idle.
    pub fn enqueue(&self, descriptor: JobDescriptor) -> Result<Enqueued, DownloadError> {
        let mut reg = self.inner.registry.lock();
        let outcome = self.enqueue_locked(&mut reg, descriptor)?;
        self.schedule_snapshot(&reg);
        Ok(outcome)
    }

    /// Enqueue several descriptors in order, e.g. the episodes of a season.
    pub fn enqueue_batch(
        &self,
        descriptors: Vec<JobDescriptor>,
    ) -> Result<Vec<Enqueued>, DownloadError> {
        let mut reg = self.inner.registry.lock();
        let mut outcomes = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            outcomes.push(self.enqueue_locked(&mut reg, descriptor)?);
        }
        self.schedule_snapshot(&reg);
        Ok(outcomes)
    }

    fn enqueue_locked(
        &self,
        reg: &mut Registry,
        descriptor: JobDescriptor,
    ) -> Result<Enqueued, DownloadError> {
        if !reg.accepting {
            return Err(DownloadError::ShuttingDown);
        }
        let owner = descriptor.owner.clone();
        let name = descriptor.name.clone();
        reg.queues.entry(owner.clone()).or_default().push_back(descriptor);

        if let Some(job_id) = self.admit_next(reg, &owner) {
            return Ok(Enqueued::Admitted { job_id });
        }

        let position = reg.queued(&owner);
        debug!(owner = %owner, name = %name, position, "Queued download");
        self.inner.notifier.emit(StatusEvent::Queued {
            owner,
            name,
            position,
        });
        Ok(Enqueued::Waiting { position })
    }

    /// Pop the owner's head entry and start it, unless the owner already has
    /// an active job or nothing is queued.
    fn admit_next(&self, reg: &mut Registry, owner: &OwnerId) -> Option<JobId> {
        if !reg.accepting || reg.by_owner.contains_key(owner) {
            return None;
        }
        let queue = reg.queues.get_mut(owner)?;
        let descriptor = queue.pop_front()?;
        if queue.is_empty() {
            reg.queues.remove(owner);
        }

        let id = JobId::new();
        let mut state = JobState::new(id, descriptor.clone());
        state.info_hash = descriptor.source.known_info_hash();
        state.phase = Phase::FetchingMetadata;
        state.admitted_at = Some(Utc::now());
        // an unanswered cancel-all prompt covers whatever becomes active
        state.cancellation_pending = reg.cancel_all_pending.contains(owner);
        info!(job_id = %id, owner = %owner, name = %descriptor.name, "Admitted download");
        self.start_job(reg, state, Start::Fresh);
        Some(id)
    }

    fn start_job(&self, reg: &mut Registry, state: JobState, start: Start) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = state.id;
        let owner = state.owner().clone();
        let descriptor = state.descriptor.clone();

        self.inner.notifier.emit(StatusEvent::PhaseChanged {
            job_id: id,
            owner: owner.clone(),
            phase: state.phase,
            origin_message: descriptor.origin_message.clone(),
        });
        reg.by_owner.insert(owner, id);
        reg.active.insert(id, ActiveJob { state, commands: tx });

        let runner = JobRunner::new(id, descriptor, self.clone(), rx);
        self.inner.tasks.spawn(runner.run(start));
    }

    /// Terminal bookkeeping: drop the job, report the outcome exactly once,
    /// and admit the owner's next entry.
    pub(crate) fn finish(&self, id: JobId, outcome: JobOutcome) {
        let mut reg = self.inner.registry.lock();
        let Some(job) = reg.active.remove(&id) else {
            return;
        };
        let owner = job.state.owner().clone();
        if reg.by_owner.get(&owner) == Some(&id) {
            reg.by_owner.remove(&owner);
        }

        info!(job_id = %id, owner = %owner, phase = %outcome.phase(), "Job reached terminal phase");
        self.inner.notifier.emit(StatusEvent::Finished {
            job_id: id,
            owner: owner.clone(),
            name: job.state.descriptor.name.clone(),
            outcome,
            origin_message: job.state.descriptor.origin_message.clone(),
        });

        self.admit_next(&mut reg, &owner);
        self.schedule_snapshot(&reg);
    }

    pub(crate) fn set_phase(&self, id: JobId, phase: Phase) {
        let mut reg = self.inner.registry.lock();
        let Ok(job) = reg.job_mut(id) else {
            return;
        };
        if job.state.phase == phase {
            return;
        }
        job.state.phase = phase;
        debug!(job_id = %id, phase = %phase, "Phase changed");
        let event = StatusEvent::PhaseChanged {
            job_id: id,
            owner: job.state.owner().clone(),
            phase,
            origin_message: job.state.descriptor.origin_message.clone(),
        };
        self.inner.notifier.emit(event);
        self.schedule_snapshot(&reg);
    }

    pub(crate) fn set_info_hash(&self, id: JobId, hash: InfoHash) {
        let mut reg = self.inner.registry.lock();
        if let Ok(job) = reg.job_mut(id) {
            job.state.info_hash = Some(hash);
            self.schedule_snapshot(&reg);
        }
    }

    // ---- pause / resume ----

    /// Flip between Transferring and Paused.
    ///
    /// The direction is decided by the job task, so toggles that are in
    /// flight together are applied one after the other.
    pub async fn toggle_pause(&self, id: JobId) -> Result<ToggleOutcome, DownloadError> {
        let commands = {
            let reg = self.inner.registry.lock();
            let job = reg.job(id)?;
            if !job.state.phase.is_reportable() {
                return Err(DownloadError::InvalidState {
                    phase: job.state.phase,
                    action: "pause or resume",
                });
            }
            job.commands.clone()
        };
        let (reply, rx) = oneshot::channel();
        Self::send_command(id, &commands, JobCommand::Toggle { reply })?;
        rx.await.map_err(|_| DownloadError::NotFound(id.to_string()))?
    }

    /// Explicit pause (`true`) or resume (`false`); a no-op reports `Unchanged`.
    pub async fn set_paused(&self, id: JobId, paused: bool) -> Result<ToggleOutcome, DownloadError> {
        let commands = {
            let reg = self.inner.registry.lock();
            let job = reg.job(id)?;
            if !job.state.phase.is_reportable() {
                return Err(DownloadError::InvalidState {
                    phase: job.state.phase,
                    action: if paused { "pause" } else { "resume" },
                });
            }
            job.commands.clone()
        };
        self.send_set_paused(id, commands, paused).await
    }

    async fn send_set_paused(
        &self,
        id: JobId,
        commands: mpsc::UnboundedSender<JobCommand>,
        paused: bool,
    ) -> Result<ToggleOutcome, DownloadError> {
        let (reply, rx) = oneshot::channel();
        Self::send_command(id, &commands, JobCommand::SetPaused { paused, reply })?;
        rx.await.map_err(|_| DownloadError::NotFound(id.to_string()))?
    }

    /// A closed channel means the job task has already exited.
    fn send_command(
        id: JobId,
        commands: &mpsc::UnboundedSender<JobCommand>,
        command: JobCommand,
    ) -> Result<(), DownloadError> {
        commands.send(command).map_err(|e| {
            debug!(job_id = %id, command = ?e.0, "Job task is gone, command dropped");
            DownloadError::NotFound(id.to_string())
        })
    }

    // ---- two-phase cancellation ----

    /// First step: raise the guard and ask the user to confirm.
    pub fn request_cancel(&self, id: JobId) -> Result<(), DownloadError> {
        let mut reg = self.inner.registry.lock();
        let job = reg.job_mut(id)?;
        job.state.cancellation_pending = true;
        let event = StatusEvent::CancelPrompt {
            job_id: id,
            owner: job.state.owner().clone(),
            origin_message: job.state.descriptor.origin_message.clone(),
        };
        debug!(job_id = %id, "Cancellation requested");
        self.inner.notifier.emit(event);
        Ok(())
    }

    /// Second step. Declining lowers the guard; confirming tears the job down.
    pub fn confirm_cancel(&self, id: JobId, confirmed: bool) -> Result<(), DownloadError> {
        let mut reg = self.inner.registry.lock();
        let job = reg.job_mut(id)?;
        if !job.state.cancellation_pending {
            return Err(DownloadError::InvalidState {
                phase: job.state.phase,
                action: "confirm cancellation",
            });
        }
        if confirmed {
            info!(job_id = %id, "Cancellation confirmed");
            let _ = Self::send_command(id, &job.commands, JobCommand::Cancel);
        } else {
            job.state.cancellation_pending = false;
            let owner = job.state.owner().clone();
            debug!(job_id = %id, "Cancellation declined");
            self.inner.notifier.emit(StatusEvent::CancelDeclined { job_id: id, owner });
        }
        Ok(())
    }

    /// First step of "cancel everything" for one owner.
    pub fn request_cancel_all(&self, owner: &OwnerId) -> Result<(), DownloadError> {
        let mut reg = self.inner.registry.lock();
        let active_job = reg.by_owner.get(owner).copied();
        let queued = reg.queued(owner);
        if active_job.is_none() && queued == 0 {
            return Err(DownloadError::NotFound(format!("downloads of {}", owner)));
        }
        reg.cancel_all_pending.insert(owner.clone());
        if let Some(id) = active_job
            && let Ok(job) = reg.job_mut(id)
        {
            job.state.cancellation_pending = true;
        }
        debug!(owner = %owner, queued, "Cancel-all requested");
        self.inner.notifier.emit(StatusEvent::CancelAllPrompt {
            owner: owner.clone(),
            active_job,
            queued,
        });
        Ok(())
    }

    /// Confirming clears the queue first, then cancels the active job, so
    /// nothing is admitted in between.
    pub fn confirm_cancel_all(&self, owner: &OwnerId, confirmed: bool) -> Result<(), DownloadError> {
        let mut reg = self.inner.registry.lock();
        if !reg.cancel_all_pending.remove(owner) {
            return Err(DownloadError::NotFound(format!("cancel-all request of {}", owner)));
        }
        let active_job = reg.by_owner.get(owner).copied();

        if confirmed {
            let discarded = reg.queues.remove(owner).map_or(0, |q| q.len());
            info!(owner = %owner, discarded, "Cancel-all confirmed");
            self.inner.notifier.emit(StatusEvent::QueueCleared {
                owner: owner.clone(),
                discarded,
            });
            if let Some(id) = active_job
                && let Some(job) = reg.active.get(&id)
            {
                let _ = Self::send_command(id, &job.commands, JobCommand::Cancel);
            }
            self.schedule_snapshot(&reg);
        } else {
            if let Some(job) = active_job.and_then(|id| reg.active.get_mut(&id)) {
                job.state.cancellation_pending = false;
            }
            self.inner.notifier.emit(StatusEvent::CancelAllDeclined { owner: owner.clone() });
        }
        Ok(())
    }

    // ---- progress ----

    /// Emit a progress payload unless a cancellation prompt is showing.
    ///
    /// The guard check and the emit happen under the same lock.
    pub(crate) fn publish_progress(&self, id: JobId, status: &EngineStatus) -> ReportOutcome {
        let reg = self.inner.registry.lock();
        let Some(job) = reg.active.get(&id) else {
            return ReportOutcome::Skipped;
        };
        if !job.state.phase.is_reportable() {
            return ReportOutcome::Skipped;
        }
        if job.state.cancellation_pending {
            debug!(job_id = %id, "Progress suppressed while cancellation is pending");
            return ReportOutcome::Suppressed;
        }

        let paused = job.state.is_paused();
        let payload = ProgressPayload {
            job_id: id,
            owner: job.state.owner().clone(),
            info_hash: job.state.info_hash.clone(),
            title: job.state.descriptor.name.clone(),
            header: if paused { "Paused" } else { "Downloading" },
            percent: status.percent(),
            state: format!("{:?}", status.state).to_lowercase(),
            peers: status.peers,
            rate_bytes_per_sec: if paused { 0 } else { status.rate_bytes_per_sec },
            action: if paused {
                ProgressAction::Resume
            } else {
                ProgressAction::Pause
            },
            show_cancel_all: reg.queued(job.state.owner()) > 0,
            origin_message: job.state.descriptor.origin_message.clone(),
        };
        self.inner.notifier.emit(StatusEvent::Progress(payload));
        ReportOutcome::Sent
    }

    /// Poll the engine for one job and report right away.
    pub async fn report_progress_now(&self, id: JobId) -> Result<ReportOutcome, DownloadError> {
        let hash = {
            let reg = self.inner.registry.lock();
            let job = reg.job(id)?;
            match &job.state.info_hash {
                Some(hash) if job.state.phase.is_reportable() => hash.clone(),
                _ => return Ok(ReportOutcome::Skipped),
            }
        };
        let status = self.inner.engine.status(&hash).await?;
        Ok(self.publish_progress(id, &status))
    }

    // ---- queries ----

    pub fn job(&self, id: JobId) -> Option<JobState> {
        self.inner
            .registry
            .lock()
            .active
            .get(&id)
            .map(|job| job.state.clone())
    }

    pub fn active_job_of(&self, owner: &OwnerId) -> Option<JobState> {
        let reg = self.inner.registry.lock();
        let id = reg.by_owner.get(owner)?;
        reg.active.get(id).map(|job| job.state.clone())
    }

    pub(crate) fn is_active(&self, id: JobId) -> bool {
        self.inner.registry.lock().active.contains_key(&id)
    }

    pub fn queue_of(&self, owner: &OwnerId) -> Vec<JobDescriptor> {
        self.inner
            .registry
            .lock()
            .queues
            .get(owner)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current queues and active jobs, in persisted form.
    pub fn snapshot(&self) -> PersistedSnapshot {
        self.inner.registry.lock().snapshot()
    }

    // ---- media-center ----

    pub(crate) fn spawn_scan(&self, kind: MediaKind) {
        let Some(scanner) = self.inner.scanner.clone() else {
            return;
        };
        self.inner.tasks.spawn(async move {
            if let Err(e) = scanner.scan(kind).await {
                warn!(kind = ?kind, error = %e, "Library scan failed");
            }
        });
    }

    // ---- persistence ----

    fn schedule_snapshot(&self, reg: &Registry) {
        if let Some((writer, _)) = self.inner.writer.lock().as_ref() {
            writer.schedule(reg.snapshot());
        }
    }

    /// Rebuild state from a snapshot.
    ///
    /// Active jobs the engine still knows are re-attached in Transferring;
    /// the rest start over from FetchingMetadata. Queued entries keep their
    /// order behind them.
    pub async fn restore(&self, snapshot: PersistedSnapshot) {
        let mut jobs = Vec::with_capacity(snapshot.active_jobs.len());
        for (_, state) in snapshot.active_jobs {
            let attached = match &state.info_hash {
                Some(hash) => self.inner.engine.contains(hash).await,
                None => false,
            };
            jobs.push((state, attached));
        }

        let mut reg = self.inner.registry.lock();
        for (mut state, attached) in jobs {
            let owner = state.owner().clone();
            if reg.active.contains_key(&state.id) {
                continue;
            }
            if reg.by_owner.contains_key(&owner) {
                warn!(job_id = %state.id, owner = %owner, "Owner already has an active job, re-queueing");
                reg.queues.entry(owner).or_default().push_front(state.descriptor);
                continue;
            }

            state.cancellation_pending = false;
            let start = match (&state.info_hash, attached) {
                (Some(hash), true) => {
                    state.phase = Phase::Transferring;
                    Start::Reattach(hash.clone())
                }
                _ => {
                    state.phase = Phase::FetchingMetadata;
                    state.info_hash = state.descriptor.source.known_info_hash();
                    Start::Fresh
                }
            };
            info!(job_id = %state.id, owner = %owner, phase = %state.phase, "Restored job");
            self.start_job(&mut reg, state, start);
        }

        for (owner, descriptors) in snapshot.queues {
            reg.queues.entry(owner).or_default().extend(descriptors);
        }
        let owners: Vec<OwnerId> = reg.queues.keys().cloned().collect();
        for owner in owners {
            self.admit_next(&mut reg, &owner);
        }
        self.schedule_snapshot(&reg);
    }

    /// Stop accepting work, detach every job, and write a final snapshot.
    pub async fn shutdown(&self) {
        let commands: Vec<_> = {
            let mut reg = self.inner.registry.lock();
            reg.accepting = false;
            reg.active
                .iter()
                .map(|(id, job)| (*id, job.commands.clone()))
                .collect()
        };
        info!(jobs = commands.len(), "Stopping download jobs");
        for (id, tx) in commands {
            let _ = Self::send_command(id, &tx, JobCommand::Shutdown);
        }

        self.inner.tasks.close();
        if tokio::time::timeout(Duration::from_secs(30), self.inner.tasks.wait())
            .await
            .is_err()
        {
            warn!("Download tasks did not stop in time");
        }

        let writer = self.inner.writer.lock().take();
        if let Some((writer, handle)) = writer {
            drop(writer);
            if let Err(e) = handle.await {
                warn!(error = %e, "Snapshot writer ended abnormally");
            }
        }
        if let Some(store) = &self.inner.store {
            let snapshot = self.snapshot();
            match store.save(&snapshot).await {
                Ok(()) => info!(
                    active = snapshot.active_jobs.len(),
                    queued = snapshot.queues.values().map(Vec::len).sum::<usize>(),
                    "Final download snapshot written"
                ),
                Err(e) => error!(error = %e, "Failed to write final download snapshot"),
            }
        }
    }
}
