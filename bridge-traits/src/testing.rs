//! In-process fakes for the bridge traits.
//!
//! Enabled with the `test-support` feature. Each fake records what the core
//! asked of it and lets a test drive the other direction (pages, progress
//! updates, permission flips) by hand.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use crate::background::{JobId, JobQueue, JobRequest};
use crate::catalog::{ContentId, ContentSource, Cursor, FetchRequest, RemoteContent, RemoteFetchError, RemotePage};
use crate::download::{DownloadEngine, TransferState, TransferUpdate, TransferUpdateStream};
use crate::error::{BridgeError, Result};
use crate::permission::{DownloadPermission, PermissionDenial};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Build `count` catalog items with ids `first..first + count`.
pub fn remote_items(first: u64, count: u64) -> Vec<RemoteContent> {
    (first..first + count)
        .map(|id| RemoteContent::new(id, format!("Episode {id}")).with_duration(600))
        .collect()
}

// ============================================================================
// Content source
// ============================================================================

/// Scripted answer to one `fetch_page` call.
#[derive(Debug)]
pub enum ScriptedResponse {
    Page(RemotePage),
    Error(RemoteFetchError),
    /// Blocks until the paired `Notify` fires, then answers with the inner response
    Held {
        release: Arc<Notify>,
        response: Box<ScriptedResponse>,
    },
}

/// Content source that answers from a FIFO script.
///
/// Calls beyond the script receive an empty last page.
#[derive(Debug, Default)]
pub struct ScriptedContentSource {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, items: Vec<RemoteContent>, next_cursor: Option<&str>) -> &Self {
        self.push(ScriptedResponse::Page(RemotePage::new(
            items,
            next_cursor.map(Cursor::new),
        )))
    }

    pub fn push_error(&self, error: RemoteFetchError) -> &Self {
        self.push(ScriptedResponse::Error(error))
    }

    /// Queue a page that is only delivered once the returned handle is notified.
    pub fn push_held_page(&self, items: Vec<RemoteContent>, next_cursor: Option<&str>) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.push(ScriptedResponse::Held {
            release: Arc::clone(&release),
            response: Box::new(ScriptedResponse::Page(RemotePage::new(
                items,
                next_cursor.map(Cursor::new),
            ))),
        });
        release
    }

    pub fn push(&self, response: ScriptedResponse) -> &Self {
        lock(&self.responses).push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl ContentSource for ScriptedContentSource {
    async fn fetch_page(&self, request: FetchRequest) -> std::result::Result<RemotePage, RemoteFetchError> {
        lock(&self.requests).push(request);
        let mut next = lock(&self.responses).pop_front();

        loop {
            match next {
                None => return Ok(RemotePage::default()),
                Some(ScriptedResponse::Page(page)) => return Ok(page),
                Some(ScriptedResponse::Error(error)) => return Err(error),
                Some(ScriptedResponse::Held { release, response }) => {
                    release.notified().await;
                    next = Some(*response);
                }
            }
        }
    }
}

// ============================================================================
// Download engine
// ============================================================================

struct ChannelUpdateStream {
    receiver: mpsc::UnboundedReceiver<TransferUpdate>,
}

#[async_trait]
impl TransferUpdateStream for ChannelUpdateStream {
    async fn next_update(&mut self) -> Option<TransferUpdate> {
        self.receiver.recv().await
    }
}

/// Download engine whose progress is pushed by the test.
#[derive(Default)]
pub struct ChannelDownloadEngine {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TransferUpdate>>>,
    statuses: Mutex<HashMap<ContentId, TransferState>>,
    started: Mutex<Vec<ContentId>>,
    removed: Mutex<Vec<ContentId>>,
    fail_commands: AtomicBool,
    pending_subscribe_failures: AtomicUsize,
    subscriptions: AtomicUsize,
}

impl ChannelDownloadEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an update to every live subscription and record it as the
    /// engine-side status.
    pub fn emit(&self, content_id: impl Into<ContentId>, state: TransferState) {
        let update = TransferUpdate::new(content_id, state);
        {
            let mut statuses = lock(&self.statuses);
            if update.state == TransferState::Removed {
                statuses.remove(&update.content_id);
            } else {
                statuses.insert(update.content_id.clone(), update.state.clone());
            }
        }
        lock(&self.subscribers).retain(|sender| sender.send(update.clone()).is_ok());
    }

    /// Drop every live subscription, as a crashed engine would.
    pub fn disconnect(&self) {
        lock(&self.subscribers).clear();
    }

    pub fn fail_next_subscriptions(&self, count: usize) {
        self.pending_subscribe_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    pub fn set_status(&self, content_id: impl Into<ContentId>, state: TransferState) {
        lock(&self.statuses).insert(content_id.into(), state);
    }

    pub fn started(&self) -> Vec<ContentId> {
        lock(&self.started).clone()
    }

    pub fn removed(&self) -> Vec<ContentId> {
        lock(&self.removed).clone()
    }

    /// Total successful `subscribe` calls so far
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn live_subscribers(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Wait until at least `count` subscriptions are live.
    pub async fn wait_for_subscribers(&self, count: usize) {
        while self.live_subscribers() < count {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn check_commands(&self) -> Result<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            return Err(BridgeError::OperationFailed(
                "download engine rejected command".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadEngine for ChannelDownloadEngine {
    async fn start(&self, id: &ContentId) -> Result<()> {
        self.check_commands()?;
        lock(&self.started).push(id.clone());
        Ok(())
    }

    async fn remove(&self, id: &ContentId) -> Result<()> {
        self.check_commands()?;
        lock(&self.removed).push(id.clone());
        Ok(())
    }

    async fn transfer_status(&self, id: &ContentId) -> Result<Option<TransferState>> {
        Ok(lock(&self.statuses).get(id).cloned())
    }

    async fn subscribe(&self) -> Result<Box<dyn TransferUpdateStream>> {
        let pending = self.pending_subscribe_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_subscribe_failures
                .store(pending - 1, Ordering::SeqCst);
            return Err(BridgeError::Disconnected(
                "download service not bound".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(sender);
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChannelUpdateStream { receiver }))
    }
}

// ============================================================================
// Job queue and permission
// ============================================================================

/// Job queue that records every scheduled request.
#[derive(Debug, Default)]
pub struct RecordingJobQueue {
    requests: Mutex<Vec<JobRequest>>,
    fail: AtomicBool,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_schedules(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl JobQueue for RecordingJobQueue {
    async fn schedule(&self, request: JobRequest) -> Result<JobId> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable("job queue offline".to_string()));
        }
        lock(&self.requests).push(request);
        Ok(JobId::generate())
    }
}

/// Permission check with a switchable answer.
#[derive(Debug)]
pub struct StaticPermission {
    allowed: AtomicBool,
    reason: Mutex<PermissionDenial>,
}

impl StaticPermission {
    pub fn allowed() -> Self {
        Self {
            allowed: AtomicBool::new(true),
            reason: Mutex::new(PermissionDenial::NoActiveSubscription),
        }
    }

    pub fn denied(reason: PermissionDenial) -> Self {
        Self {
            allowed: AtomicBool::new(false),
            reason: Mutex::new(reason),
        }
    }

    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
    }
}

impl DownloadPermission for StaticPermission {
    fn can_download(&self) -> bool {
        self.allowed.load(Ordering::SeqCst)
    }

    fn denial_reason(&self) -> PermissionDenial {
        *lock(&self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_source_replays_in_order() {
        let source = ScriptedContentSource::new();
        source
            .push_page(remote_items(1, 2), Some("p2"))
            .push_error(RemoteFetchError::Network("offline".into()));

        let first = source.fetch_page(FetchRequest::first(2)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor, Some(Cursor::new("p2")));

        let second = source
            .fetch_page(FetchRequest::after(Cursor::new("p2"), 2))
            .await;
        assert!(matches!(second, Err(RemoteFetchError::Network(_))));

        let exhausted = source.fetch_page(FetchRequest::first(2)).await.unwrap();
        assert!(exhausted.items.is_empty());
        assert_eq!(source.request_count(), 3);
    }

    #[tokio::test]
    async fn test_channel_engine_fans_out_to_subscribers() {
        let engine = ChannelDownloadEngine::new();
        let mut first = engine.subscribe().await.unwrap();
        let mut second = engine.subscribe().await.unwrap();

        engine.emit("9", TransferState::Completed);

        assert_eq!(first.next_update().await.unwrap().state, TransferState::Completed);
        assert_eq!(second.next_update().await.unwrap().content_id, ContentId::new("9"));
        assert_eq!(
            engine.transfer_status(&ContentId::new("9")).await.unwrap(),
            Some(TransferState::Completed)
        );

        engine.disconnect();
        assert!(first.next_update().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_engine_subscribe_failures() {
        let engine = ChannelDownloadEngine::new();
        engine.fail_next_subscriptions(1);
        assert!(engine.subscribe().await.is_err());
        assert!(engine.subscribe().await.is_ok());
        assert_eq!(engine.subscription_count(), 1);
    }

    #[test]
    fn test_static_permission_toggle() {
        let permission = StaticPermission::denied(PermissionDenial::StoragePermissionMissing);
        assert!(!permission.can_download());
        assert_eq!(
            permission.denial_reason(),
            PermissionDenial::StoragePermissionMissing
        );
        permission.set_allowed(true);
        assert!(permission.can_download());
    }
}
