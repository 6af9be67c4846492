//! # Download Coordinator
//!
//! Wraps the host download engine for the rest of the core.
//!
//! ## Overview
//!
//! - Hands download and removal jobs to the background [`JobQueue`] when one
//!   is configured, otherwise straight to the [`DownloadEngine`]
//! - Runs a progress pump that maps engine updates onto [`DownloadState`],
//!   persists each accepted transition, then broadcasts it
//! - Reconnects to the engine with exponential backoff; consumers never see
//!   their stream end because of an engine restart
//! - Reconciles records left behind by a previous process (stuck removals,
//!   transfers the engine no longer knows about)
//!
//! ## Usage
//!
//! ```rust,ignore
//! let coordinator = DownloadCoordinator::new(engine, store)
//!     .with_job_queue(queue)
//!     .with_event_bus(bus);
//! coordinator.start();
//! coordinator.reconcile().await?;
//!
//! let mut progress = coordinator.subscribe_progress();
//! coordinator.enqueue_download(&ContentId::new("42")).await?;
//! ```

use crate::mapping::map_transfer_state;
use crate::progress::{DownloadProgress, ProgressStream, DEFAULT_PROGRESS_BUFFER_SIZE};
use crate::{DownloadError, Result};
use bridge_traits::background::{JobKind, JobQueue, JobRequest};
use bridge_traits::download::{DownloadEngine, TransferState, TransferUpdateStream};
use core_library::{
    ContentId, DownloadState, LocalRecord, LocalStore, PageRequest, RecordFilter,
    TransitionOutcome,
};
use core_runtime::config::BackoffPolicy;
use core_runtime::events::{CoreEvent, DownloadEvent, EventBus};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Records fetched per store page during reconciliation
const RECONCILE_BATCH: u32 = 100;

/// Outcome of [`DownloadCoordinator::reconcile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pending removals the engine confirmed gone
    pub resolved: usize,
    /// Pending removals handed back to the job queue
    pub requeued: usize,
    /// Queued or running downloads the engine lost, now `Failed`
    pub failed: usize,
}

/// Persists accepted transitions and fans them out.
#[derive(Clone)]
struct Publisher {
    store: Arc<dyn LocalStore>,
    progress: broadcast::Sender<DownloadProgress>,
    event_bus: Option<EventBus>,
}

impl Publisher {
    /// Apply `state` to `id` if the lifecycle allows it.
    ///
    /// Returns `true` when the transition was written and broadcast.
    async fn apply(&self, id: &ContentId, state: DownloadState) -> Result<bool> {
        match self.store.transition_download_state(id, state).await? {
            TransitionOutcome::Applied(record) => {
                self.publish(record);
                Ok(true)
            }
            TransitionOutcome::Unchanged(_) => Ok(false),
            TransitionOutcome::Rejected { current } => {
                debug!(
                    content_id = %id,
                    current = %current,
                    rejected = %state,
                    "Dropping out-of-order download update"
                );
                Ok(false)
            }
        }
    }

    fn publish(&self, record: LocalRecord) {
        let state = record.download_state;
        self.emit(DownloadEvent::StateChanged {
            content_id: record.content_id.to_string(),
            state: state.as_str().to_string(),
            percent: state.percent(),
        });
        // No receivers is fine: the store already holds the state.
        let _ = self
            .progress
            .send(DownloadProgress::new(record.content_id, state));
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Download(event)).ok();
        }
    }
}

/// Coordinates job hand-off and progress for every download in a session.
pub struct DownloadCoordinator {
    engine: Arc<dyn DownloadEngine>,
    job_queue: Option<Arc<dyn JobQueue>>,
    publisher: Publisher,
    backoff: BackoffPolicy,
    shutdown: CancellationToken,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadCoordinator {
    pub fn new(engine: Arc<dyn DownloadEngine>, store: Arc<dyn LocalStore>) -> Self {
        let (progress, _) = broadcast::channel(DEFAULT_PROGRESS_BUFFER_SIZE);

        Self {
            engine,
            job_queue: None,
            publisher: Publisher {
                store,
                progress,
                event_bus: None,
            },
            backoff: BackoffPolicy::default(),
            shutdown: CancellationToken::new(),
            pump: Mutex::new(None),
        }
    }

    /// Route jobs through a persistent background queue.
    pub fn with_job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.job_queue = Some(queue);
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.publisher.event_bus = Some(bus);
        self
    }

    pub fn with_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Replace the progress channel with one of `capacity` slots.
    ///
    /// Must be called before anyone subscribes.
    pub fn with_progress_capacity(mut self, capacity: usize) -> Self {
        let (progress, _) = broadcast::channel(capacity.max(1));
        self.publisher.progress = progress;
        self
    }

    /// Start the progress pump. Calling it again is a no-op.
    pub fn start(&self) {
        let mut pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner);
        if pump.is_some() {
            return;
        }

        let task = ProgressPump {
            engine: Arc::clone(&self.engine),
            publisher: self.publisher.clone(),
            backoff: self.backoff,
            shutdown: self.shutdown.child_token(),
        };
        *pump = Some(tokio::spawn(task.run()));
        debug!("Progress pump started");
    }

    /// Stop the pump and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Progress pump ended abnormally");
            }
        }
    }

    pub fn subscribe_progress(&self) -> ProgressStream {
        ProgressStream::new(self.publisher.progress.subscribe())
    }

    /// Hand a download job off and return.
    ///
    /// # Errors
    ///
    /// If the queue or engine refuses the job the item is moved to `Failed`
    /// (persisted and broadcast) and the hand-off error is returned.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn enqueue_download(&self, id: &ContentId) -> Result<()> {
        match self.hand_off(JobRequest::download(id.clone())).await {
            Ok(()) => {
                debug!("Download handed off");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Download hand-off failed");
                self.publisher.apply(id, DownloadState::Failed).await?;
                Err(e)
            }
        }
    }

    /// Hand a removal job off and return.
    ///
    /// # Errors
    ///
    /// Returns the hand-off error. The record keeps its `PendingRemoval`
    /// state for the next reconciliation.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn enqueue_removal(&self, id: &ContentId) -> Result<()> {
        self.hand_off(JobRequest::removal(id.clone()))
            .await
            .map_err(|e| {
                warn!(error = %e, "Removal hand-off failed; left pending");
                e
            })?;
        debug!("Removal handed off");
        Ok(())
    }

    /// Resolve records a previous process left mid-flight.
    ///
    /// - `PendingRemoval` with no engine artifact (or one already removed)
    ///   becomes `NotDownloaded`; otherwise the removal is re-enqueued.
    /// - `Queued`/`InProgress` the engine has no transfer for becomes
    ///   `Failed`; ones it does know are brought up to the engine's state.
    ///
    /// Records whose engine status cannot be read are left for next time.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for record in self
            .records_in(RecordFilter::in_states([DownloadState::PendingRemoval]))
            .await?
        {
            let id = &record.content_id;
            match self.engine.transfer_status(id).await {
                Ok(None) | Ok(Some(TransferState::Removed)) => {
                    if self.publisher.apply(id, DownloadState::NotDownloaded).await? {
                        report.resolved += 1;
                    }
                }
                Ok(Some(_)) => match self.hand_off(JobRequest::removal(id.clone())).await {
                    Ok(()) => report.requeued += 1,
                    Err(e) => warn!(content_id = %id, error = %e, "Could not re-enqueue removal"),
                },
                Err(e) => warn!(content_id = %id, error = %e, "Engine status unavailable"),
            }
        }

        for record in self
            .records_in(RecordFilter::in_states([
                DownloadState::Queued,
                DownloadState::InProgress(0),
            ]))
            .await?
        {
            let id = &record.content_id;
            match self.engine.transfer_status(id).await {
                Ok(None) => {
                    if self.publisher.apply(id, DownloadState::Failed).await? {
                        report.failed += 1;
                    }
                }
                Ok(Some(state)) => {
                    self.publisher.apply(id, map_transfer_state(&state)).await?;
                }
                Err(e) => warn!(content_id = %id, error = %e, "Engine status unavailable"),
            }
        }

        info!(
            resolved = report.resolved,
            requeued = report.requeued,
            failed = report.failed,
            "Download reconciliation finished"
        );
        self.publisher.emit(DownloadEvent::Reconciled {
            resolved: report.resolved,
            requeued: report.requeued,
            failed: report.failed,
        });

        Ok(report)
    }

    async fn hand_off(&self, request: JobRequest) -> Result<()> {
        if let Some(queue) = &self.job_queue {
            let kind = request.kind;
            let job_id = queue.schedule(request).await?;
            debug!(job_id = %job_id, kind = %kind, "Job scheduled");
            return Ok(());
        }

        match request.kind {
            JobKind::Download => self.engine.start(&request.content_id).await,
            JobKind::Removal => self.engine.remove(&request.content_id).await,
        }
        .map_err(DownloadError::from)
    }

    /// Every record matching `filter`, collected before any is modified.
    async fn records_in(&self, filter: RecordFilter) -> Result<Vec<LocalRecord>> {
        let mut records = Vec::new();
        let mut request = PageRequest::new(0, RECONCILE_BATCH);

        loop {
            let page = self.publisher.store.list(&filter, request).await?;
            let has_next = page.has_next();
            records.extend(page.items);
            if !has_next {
                return Ok(records);
            }
            request = PageRequest::new(request.page + 1, RECONCILE_BATCH);
        }
    }
}

impl Drop for DownloadCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Background task moving engine updates into the store and the channel.
struct ProgressPump {
    engine: Arc<dyn DownloadEngine>,
    publisher: Publisher,
    backoff: BackoffPolicy,
    shutdown: CancellationToken,
}

impl ProgressPump {
    async fn run(self) {
        let mut delay = self.backoff.initial;

        loop {
            let subscription = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                subscription = self.engine.subscribe() => subscription,
            };

            match subscription {
                Ok(mut stream) => {
                    info!("Subscribed to download engine");
                    delay = self.backoff.initial;
                    if self.drain(stream.as_mut()).await {
                        break;
                    }
                    warn!("Download engine stream ended");
                }
                Err(e) => warn!(error = %e, "Download engine subscription failed"),
            }

            self.publisher.emit(DownloadEvent::EngineDisconnected {
                retry_in_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.backoff.next_delay(delay);
        }

        debug!("Progress pump stopped");
    }

    /// Forward updates until the stream ends. Returns `true` on shutdown.
    async fn drain(&self, stream: &mut dyn TransferUpdateStream) -> bool {
        loop {
            let update = tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                update = stream.next_update() => update,
            };

            let Some(update) = update else {
                return false;
            };

            let state = map_transfer_state(&update.state);
            if self.persist(&update.content_id, state).await {
                return true;
            }
        }
    }

    /// Write one update, retrying store failures with backoff.
    ///
    /// The engine does not resend updates, so later ones wait behind this
    /// one. Returns `true` on shutdown.
    async fn persist(&self, id: &ContentId, state: DownloadState) -> bool {
        let mut delay = self.backoff.initial;

        loop {
            let error = match self.publisher.apply(id, state).await {
                Ok(_) => return false,
                Err(e) => e,
            };

            let retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            warn!(
                content_id = %id,
                state = %state,
                error = %error,
                retry_in_ms,
                "Failed to persist download update"
            );
            self.publisher.emit(DownloadEvent::PersistRetrying {
                content_id: id.to_string(),
                error: error.to_string(),
                retry_in_ms,
            });

            tokio::select! {
                _ = self.shutdown.cancelled() => return true,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = self.backoff.next_delay(delay);
        }
    }
}
