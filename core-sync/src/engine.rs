//! # Content Sync Engine
//!
//! Merges remote pages with local state and publishes one ordered listing.
//!
//! ## Overview
//!
//! The engine is a single task that owns the listing. Every mutation (a page
//! arriving, a local change, a download progress patch) is folded in by that
//! task one at a time, so published values are linearizable. Remote fetches
//! run in their own tasks and report back through the same loop; a fetch
//! that was cancelled or superseded is recognised by its generation number
//! and never published.
//!
//! ## Sources of change
//!
//! - **Remote pages**: requested through [`ContentSyncEngine::load_first_page`],
//!   [`load_next_page`](ContentSyncEngine::load_next_page),
//!   [`refresh`](ContentSyncEngine::refresh) and [`retry`](ContentSyncEngine::retry)
//! - **Local changes**: [`BoundaryChange`]s from the [`BoundaryNotifier`]
//!   re-overlay items already in view without a network call
//! - **Download progress**: accepted updates from the download coordinator
//!   patch the matching row in place
//!
//! ## Usage
//!
//! ```rust,ignore
//! let engine = ContentSyncEngine::builder(source, store)
//!     .progress(coordinator.subscribe_progress())
//!     .boundary(&notifier)
//!     .page_size(20)
//!     .spawn();
//!
//! engine.load_first_page().await?;
//! let listing = engine.settled().await?;
//! ```

use crate::boundary::{BoundaryChange, BoundaryNotifier};
use crate::listing::MergedListing;
use crate::network_state::NetworkState;
use crate::{Result, SyncError};
use bridge_traits::catalog::{ContentSource, Cursor, FetchRequest, RemoteFetchError, RemotePage};
use core_download::{DownloadProgress, ProgressStream};
use core_library::{ContentId, ContentItem, DownloadState, LocalRecord, LocalStore, TransitionOutcome};
use core_runtime::config::DEFAULT_PAGE_SIZE;
use core_runtime::events::{CoreEvent, EventBus, ListingEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Capacity of the engine's command queue
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 32;

/// Answer to a load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// A fetch was issued; watch the listing for the result
    Started,
    /// Another fetch is running; nothing changed
    AlreadyInFlight,
    /// The request is not valid in the current state; nothing changed
    Rejected(LoadRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadRejection {
    /// `load_next_page` before any page succeeded
    NoSuccessfulPage,
    /// The last page had no cursor
    NoMorePages,
    /// `retry` while the last load did not fail
    NothingToRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadKind {
    Initial,
    Next,
}

#[derive(Debug, Clone, Copy)]
enum LoadRequest {
    First,
    Next,
    Retry,
}

enum Command {
    Load {
        request: LoadRequest,
        reply: oneshot::Sender<LoadStatus>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    LocalChange {
        change: BoundaryChange,
        reply: oneshot::Sender<()>,
    },
    Progress {
        update: DownloadProgress,
        reply: oneshot::Sender<Result<()>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

struct PageResult {
    generation: u64,
    kind: LoadKind,
    result: std::result::Result<RemotePage, RemoteFetchError>,
}

struct InFlight {
    generation: u64,
    kind: LoadKind,
    token: CancellationToken,
}

/// Builder for [`ContentSyncEngine`].
pub struct ContentSyncEngineBuilder {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn LocalStore>,
    progress: Option<ProgressStream>,
    boundary: Option<broadcast::Receiver<BoundaryChange>>,
    page_size: u32,
    fetch_timeout: Option<Duration>,
    event_bus: Option<EventBus>,
    command_buffer: usize,
}

impl ContentSyncEngineBuilder {
    /// Patch the listing from this progress stream.
    pub fn progress(mut self, stream: ProgressStream) -> Self {
        self.progress = Some(stream);
        self
    }

    /// Re-overlay on changes signalled through `notifier`.
    pub fn boundary(mut self, notifier: &BoundaryNotifier) -> Self {
        self.boundary = Some(notifier.subscribe());
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Fail a fetch that has not answered within `timeout`.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity.max(1);
        self
    }

    /// Start the engine task on the current Tokio runtime.
    pub fn spawn(self) -> ContentSyncEngine {
        let (commands_tx, commands_rx) = mpsc::channel(self.command_buffer);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (listing_tx, listing_rx) = watch::channel(MergedListing::default());
        let shutdown = CancellationToken::new();

        let actor = EngineActor {
            source: self.source,
            store: self.store,
            event_bus: self.event_bus,
            page_size: self.page_size,
            fetch_timeout: self.fetch_timeout,
            listing: listing_tx,
            results: results_tx,
            shutdown: shutdown.clone(),
            items: Vec::new(),
            positions: HashMap::new(),
            network_state: NetworkState::Idle,
            settled_state: NetworkState::Idle,
            next_cursor: None,
            pages_loaded: 0,
            last_error: None,
            generation: 0,
            in_flight: None,
        };

        let task = tokio::spawn(actor.run(commands_rx, results_rx, self.progress, self.boundary));
        debug!(page_size = self.page_size, "Sync engine started");

        ContentSyncEngine {
            commands: commands_tx,
            listing: listing_rx,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Handle to the engine task.
///
/// Dropping the handle stops the task and cancels any running fetch.
pub struct ContentSyncEngine {
    commands: mpsc::Sender<Command>,
    listing: watch::Receiver<MergedListing>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ContentSyncEngine {
    pub fn builder(source: Arc<dyn ContentSource>, store: Arc<dyn LocalStore>) -> ContentSyncEngineBuilder {
        ContentSyncEngineBuilder {
            source,
            store,
            progress: None,
            boundary: None,
            page_size: DEFAULT_PAGE_SIZE,
            fetch_timeout: None,
            event_bus: None,
            command_buffer: DEFAULT_COMMAND_BUFFER_SIZE,
        }
    }

    /// Observe the published listing.
    pub fn listing(&self) -> watch::Receiver<MergedListing> {
        self.listing.clone()
    }

    pub fn snapshot(&self) -> MergedListing {
        self.listing.borrow().clone()
    }

    /// Load page one, replacing the listing once it arrives.
    ///
    /// A no-op returning [`LoadStatus::AlreadyInFlight`] while any fetch is
    /// running. On failure the items already shown are kept.
    #[instrument(skip(self))]
    pub async fn load_first_page(&self) -> Result<LoadStatus> {
        self.load(LoadRequest::First).await
    }

    /// Append the page after the stored cursor.
    ///
    /// Rejected until a page has succeeded, and after the last page.
    #[instrument(skip(self))]
    pub async fn load_next_page(&self) -> Result<LoadStatus> {
        self.load(LoadRequest::Next).await
    }

    /// Swipe-to-refresh: a fresh first-page load.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<LoadStatus> {
        self.load(LoadRequest::First).await
    }

    /// Re-issue the load that last failed.
    #[instrument(skip(self))]
    pub async fn retry(&self) -> Result<LoadStatus> {
        self.load(LoadRequest::Retry).await
    }

    /// Abandon the running fetch, if any.
    ///
    /// Returns `true` if a fetch was cancelled. The network state goes back
    /// to its last settled value.
    #[instrument(skip(self))]
    pub async fn cancel_load(&self) -> Result<bool> {
        self.request(|reply| Command::Cancel { reply }).await
    }

    /// Re-overlay local state for the items `change` covers.
    ///
    /// Returns once the merge is applied. Ids not in view are ignored.
    pub async fn on_local_change(&self, change: BoundaryChange) -> Result<()> {
        self.request(|reply| Command::LocalChange { change, reply }).await
    }

    /// Record a download state reported outside the coordinator.
    ///
    /// The state is written to the local store and, if the item is in view,
    /// patched into the listing. Progress above 100% is clamped.
    ///
    /// # Errors
    ///
    /// [`SyncError::Store`] if the write fails; the listing is left as is.
    pub async fn on_download_progress(&self, id: ContentId, state: DownloadState) -> Result<()> {
        let state = match state {
            DownloadState::InProgress(percent) => DownloadState::in_progress(percent),
            other => other,
        };
        let update = DownloadProgress::new(id, state);
        self.request(|reply| Command::Progress { update, reply }).await?
    }

    /// Wait until every command, progress update and boundary change
    /// delivered before this call has been merged.
    pub async fn flush(&self) -> Result<()> {
        self.request(|reply| Command::Flush { reply }).await
    }

    /// Wait for a listing matching `predicate`.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<MergedListing>
    where
        F: FnMut(&MergedListing) -> bool,
    {
        let mut listing = self.listing.clone();
        let matched = listing
            .wait_for(|value| predicate(value))
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        Ok(matched.clone())
    }

    /// Wait until no fetch is running.
    pub async fn settled(&self) -> Result<MergedListing> {
        self.wait_until(|listing| listing.network_state.is_settled())
            .await
    }

    /// Stop the engine task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Sync engine ended abnormally");
            }
        }
    }

    async fn load(&self, request: LoadRequest) -> Result<LoadStatus> {
        self.request(|reply| Command::Load { request, reply }).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SyncError::EngineStopped)?;
        response.await.map_err(|_| SyncError::EngineStopped)
    }
}

impl Drop for ContentSyncEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// State owned by the engine task.
struct EngineActor {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn LocalStore>,
    event_bus: Option<EventBus>,
    page_size: u32,
    fetch_timeout: Option<Duration>,
    listing: watch::Sender<MergedListing>,
    results: mpsc::UnboundedSender<PageResult>,
    shutdown: CancellationToken,

    items: Vec<ContentItem>,
    /// Index into `items` by id
    positions: HashMap<ContentId, usize>,
    network_state: NetworkState,
    /// Last non-`Loading` state, restored on cancel
    settled_state: NetworkState,
    next_cursor: Option<Cursor>,
    pages_loaded: u32,
    last_error: Option<RemoteFetchError>,
    generation: u64,
    in_flight: Option<InFlight>,
}

impl EngineActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut results: mpsc::UnboundedReceiver<PageResult>,
        mut progress: Option<ProgressStream>,
        mut boundary: Option<broadcast::Receiver<BoundaryChange>>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(result) = results.recv() => self.on_page_result(result).await,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command, &mut progress, &mut boundary).await,
                    None => break,
                },
                update = next_progress(&mut progress) => match update {
                    Ok(update) => self.on_download_progress(update).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Progress updates lagged; re-merging from store");
                        self.on_local_change(BoundaryChange::All).await;
                    }
                    Err(RecvError::Closed) => {
                        debug!("Progress stream closed");
                        progress = None;
                    }
                },
                change = next_boundary(&mut boundary) => match change {
                    Ok(change) => self.on_local_change(change).await,
                    Err(RecvError::Lagged(_)) => self.on_local_change(BoundaryChange::All).await,
                    Err(RecvError::Closed) => {
                        debug!("Boundary channel closed");
                        boundary = None;
                    }
                },
            }
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
        }
        debug!("Sync engine stopped");
    }

    async fn handle(
        &mut self,
        command: Command,
        progress: &mut Option<ProgressStream>,
        boundary: &mut Option<broadcast::Receiver<BoundaryChange>>,
    ) {
        match command {
            Command::Load { request, reply } => {
                let status = self.on_load(request);
                let _ = reply.send(status);
            }
            Command::Cancel { reply } => {
                let cancelled = self.cancel_load();
                let _ = reply.send(cancelled);
            }
            Command::LocalChange { change, reply } => {
                self.on_local_change(change).await;
                let _ = reply.send(());
            }
            Command::Progress { update, reply } => {
                let result = self.on_host_progress(update).await;
                let _ = reply.send(result);
            }
            Command::Flush { reply } => {
                self.drain_pending(progress, boundary).await;
                let _ = reply.send(());
            }
        }
    }

    fn on_load(&mut self, request: LoadRequest) -> LoadStatus {
        if self.in_flight.is_some() {
            debug!(?request, "Load ignored: fetch already in flight");
            return LoadStatus::AlreadyInFlight;
        }

        let kind = match request {
            LoadRequest::First => LoadKind::Initial,
            LoadRequest::Next => match self.next_page_rejection() {
                Some(rejection) => return self.reject(request, rejection),
                None => LoadKind::Next,
            },
            LoadRequest::Retry => match self.network_state {
                NetworkState::InitFailed => LoadKind::Initial,
                NetworkState::Failed => match self.next_page_rejection() {
                    Some(rejection) => return self.reject(request, rejection),
                    None => LoadKind::Next,
                },
                _ => return self.reject(request, LoadRejection::NothingToRetry),
            },
        };

        self.start_fetch(kind);
        LoadStatus::Started
    }

    fn next_page_rejection(&self) -> Option<LoadRejection> {
        // A failed first page (including a failed refresh) invalidates the cursor.
        if self.pages_loaded == 0 || self.settled_state == NetworkState::InitFailed {
            Some(LoadRejection::NoSuccessfulPage)
        } else if self.next_cursor.is_none() {
            Some(LoadRejection::NoMorePages)
        } else {
            None
        }
    }

    fn reject(&self, request: LoadRequest, rejection: LoadRejection) -> LoadStatus {
        debug!(?request, ?rejection, "Load rejected");
        LoadStatus::Rejected(rejection)
    }

    fn start_fetch(&mut self, kind: LoadKind) {
        let request = match (kind, &self.next_cursor) {
            (LoadKind::Next, Some(cursor)) => FetchRequest::after(cursor.clone(), self.page_size),
            _ => FetchRequest::first(self.page_size),
        };

        self.generation += 1;
        let generation = self.generation;
        let token = self.shutdown.child_token();

        let cancelled = token.clone();
        let source = Arc::clone(&self.source);
        let results = self.results.clone();
        let fetch_timeout = self.fetch_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => trace!(generation, "Fetch abandoned"),
                result = fetch_page(source.as_ref(), request, fetch_timeout) => {
                    // The engine is gone if this fails; nothing to deliver to.
                    let _ = results.send(PageResult { generation, kind, result });
                }
            }
        });

        debug!(generation, ?kind, "Page fetch started");
        self.in_flight = Some(InFlight {
            generation,
            kind,
            token,
        });
        self.set_state(NetworkState::Loading);
        self.publish();
    }

    fn cancel_load(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };

        in_flight.token.cancel();
        self.network_state = self.settled_state;
        self.publish();

        info!(generation = in_flight.generation, "Page load cancelled");
        self.emit(ListingEvent::LoadCancelled {
            initial: in_flight.kind == LoadKind::Initial,
        });
        true
    }

    async fn on_page_result(&mut self, result: PageResult) {
        let current = self.in_flight.as_ref().map(|in_flight| in_flight.generation);
        if current != Some(result.generation) {
            debug!(generation = result.generation, "Discarding stale page result");
            return;
        }
        self.in_flight = None;

        match result.result {
            Ok(page) => self.on_remote_page(result.kind, page).await,
            Err(error) => self.on_fetch_failed(result.kind, error),
        }
    }

    /// Overlay local state onto `page` and append it in remote order.
    async fn on_remote_page(&mut self, kind: LoadKind, page: RemotePage) {
        let ids: Vec<ContentId> = page.items.iter().map(|item| item.id.clone()).collect();
        let records = self.read_local(&ids).await;

        if kind == LoadKind::Initial {
            self.items.clear();
            self.positions.clear();
            self.pages_loaded = 0;
        }

        let before = self.items.len();
        let mut duplicates = 0usize;
        for remote in page.items {
            if self.positions.contains_key(&remote.id) {
                duplicates += 1;
                continue;
            }
            let local = records.get(&remote.id);
            let item = ContentItem::overlay(remote, local);
            self.positions.insert(item.id().clone(), self.items.len());
            self.items.push(item);
        }
        let added = self.items.len() - before;
        if duplicates > 0 {
            debug!(duplicates, "Dropped items already in view");
        }

        self.next_cursor = page.next_cursor;
        self.pages_loaded += 1;
        self.last_error = None;

        let state = match kind {
            LoadKind::Initial if self.items.is_empty() => NetworkState::InitEmpty,
            LoadKind::Initial => NetworkState::InitSuccess,
            LoadKind::Next => NetworkState::Success,
        };
        self.set_state(state);
        self.publish();

        let has_more = self.next_cursor.is_some();
        info!(page = self.pages_loaded, items = added, has_more, state = %state, "Page merged");
        self.emit(ListingEvent::PageLoaded {
            page: self.pages_loaded,
            items: added,
            has_more,
        });
    }

    fn on_fetch_failed(&mut self, kind: LoadKind, error: RemoteFetchError) {
        let initial = kind == LoadKind::Initial;
        warn!(initial, error = %error, kept = self.items.len(), "Page load failed");

        self.emit(ListingEvent::LoadFailed {
            initial,
            reason: error.to_string(),
            retriable: error.is_retriable(),
        });
        self.last_error = Some(error);
        self.set_state(if initial {
            NetworkState::InitFailed
        } else {
            NetworkState::Failed
        });
        self.publish();
    }

    /// Re-overlay the items `change` covers. Never touches the network state.
    async fn on_local_change(&mut self, change: BoundaryChange) {
        let mut positions: Vec<usize> = match &change {
            BoundaryChange::All => (0..self.items.len()).collect(),
            BoundaryChange::Ids(ids) => ids
                .iter()
                .filter_map(|id| self.positions.get(id).copied())
                .collect(),
        };
        if positions.is_empty() {
            trace!("Local change outside current view");
            return;
        }
        positions.sort_unstable();
        positions.dedup();

        let ids: Vec<ContentId> = positions
            .iter()
            .map(|&position| self.items[position].id().clone())
            .collect();
        let records = self.read_local(&ids).await;

        let mut changed = 0usize;
        for position in positions {
            let current = &self.items[position];
            let merged = ContentItem::overlay(current.remote.clone(), records.get(current.id()));
            if merged != *current {
                self.items[position] = merged;
                changed += 1;
            }
        }

        if changed > 0 {
            trace!(changed, "Local change merged");
            self.publish();
        }
    }

    /// Write a host-reported state to the store, then patch the view.
    async fn on_host_progress(&mut self, update: DownloadProgress) -> Result<()> {
        let outcome = self
            .store
            .transition_download_state(&update.content_id, update.state)
            .await
            .map_err(|e| {
                warn!(content_id = %update.content_id, error = %e, "Failed to record progress");
                SyncError::Store(e)
            })?;

        if let TransitionOutcome::Rejected { current } = outcome {
            debug!(
                content_id = %update.content_id,
                current = %current,
                rejected = %update.state,
                "Dropping out-of-order progress"
            );
            return Ok(());
        }

        self.on_download_progress(update).await;
        Ok(())
    }

    /// Patch one item's download state. The update is already in the store.
    async fn on_download_progress(&mut self, update: DownloadProgress) {
        let Some(&position) = self.positions.get(&update.content_id) else {
            trace!(content_id = %update.content_id, "Progress for item outside view");
            return;
        };

        let current = self.items[position].download_state;
        if current == update.state {
            return;
        }

        if !current.can_transition_to(&update.state) {
            // The store accepted it, so the view is behind; resync this row.
            self.on_local_change(BoundaryChange::single(update.content_id)).await;
            return;
        }

        let item = &self.items[position];
        self.items[position] = ContentItem {
            remote: item.remote.clone(),
            bookmarked: item.bookmarked,
            download_state: update.state,
        };
        self.publish();
    }

    async fn drain_pending(
        &mut self,
        progress: &mut Option<ProgressStream>,
        boundary: &mut Option<broadcast::Receiver<BoundaryChange>>,
    ) {
        if let Some(stream) = progress.as_mut() {
            loop {
                match stream.try_recv() {
                    Ok(update) => self.on_download_progress(update).await,
                    Err(TryRecvError::Lagged(_)) => self.on_local_change(BoundaryChange::All).await,
                    Err(_) => break,
                }
            }
        }

        if let Some(receiver) = boundary.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(change) => self.on_local_change(change).await,
                    Err(TryRecvError::Lagged(_)) => self.on_local_change(BoundaryChange::All).await,
                    Err(_) => break,
                }
            }
        }
    }

    /// Local records for `ids`. A read failure yields no records.
    async fn read_local(&self, ids: &[ContentId]) -> HashMap<ContentId, LocalRecord> {
        if ids.is_empty() {
            return HashMap::new();
        }

        match self.store.get_many(ids).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, count = ids.len(), "Local store read failed; using remote data only");
                HashMap::new()
            }
        }
    }

    fn set_state(&mut self, state: NetworkState) {
        self.network_state = state;
        if state.is_settled() {
            self.settled_state = state;
        }
    }

    fn publish(&self) {
        self.listing.send_replace(MergedListing {
            items: self.items.clone(),
            network_state: self.network_state,
            has_more: self.next_cursor.is_some(),
            last_error: self.last_error.clone(),
        });
    }

    fn emit(&self, event: ListingEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Listing(event)).ok();
        }
    }
}

async fn fetch_page(
    source: &dyn ContentSource,
    request: FetchRequest,
    limit: Option<Duration>,
) -> std::result::Result<RemotePage, RemoteFetchError> {
    match limit {
        Some(limit) => match tokio::time::timeout(limit, source.fetch_page(request)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteFetchError::Timeout(limit)),
        },
        None => source.fetch_page(request).await,
    }
}

async fn next_progress(
    stream: &mut Option<ProgressStream>,
) -> std::result::Result<DownloadProgress, RecvError> {
    match stream {
        Some(stream) => stream.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_boundary(
    receiver: &mut Option<broadcast::Receiver<BoundaryChange>>,
) -> std::result::Result<BoundaryChange, RecvError> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
