//! # Event Bus System
//!
//! Broadcasts side-channel notifications from the content core using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The merged listing is the only state the presentation layer renders. Some
//! things it still wants to hear about happen outside that value: a bookmark
//! was added (toast), a download was denied (dialog), the download engine went
//! away (banner). Those travel on the event bus:
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐   subscribe   ┌────────────┐
//! │ Sync engine  ├────────────>│           ├──────────────>│ Subscriber │
//! └──────────────┘             │ EventBus  │               └────────────┘
//! ┌──────────────┐    emit     │ (broadcast│   subscribe   ┌────────────┐
//! │ Coordinator  ├────────────>│  channel) ├──────────────>│ Subscriber │
//! └──────────────┘             │           │               └────────────┘
//! ┌──────────────┐    emit     │           │
//! │ Delegates    ├────────────>│           │
//! └──────────────┘             └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ActionEvent, CoreEvent, EventBus};
//!
//! let bus = EventBus::new(64);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(CoreEvent::Action(ActionEvent::BookmarkAdded {
//!     content_id: "42".to_string(),
//! }))
//! .ok();
//!
//! assert!(matches!(receiver.try_recv(), Ok(CoreEvent::Action(_))));
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it may keep receiving.
//! - **`RecvError::Closed`**: every sender was dropped; the session is shutting down.
//!
//! Emitting with no subscribers returns `Err`, which producers ignore with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Paginated listing lifecycle
    Listing(ListingEvent),
    /// Download state and coordinator health
    Download(DownloadEvent),
    /// Results of user actions
    Action(ActionEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Listing(e) => e.description(),
            CoreEvent::Download(e) => e.description(),
            CoreEvent::Action(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Listing(ListingEvent::LoadFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Download(DownloadEvent::EngineDisconnected { .. })
            | CoreEvent::Download(DownloadEvent::PersistRetrying { .. }) => EventSeverity::Warning,
            CoreEvent::Action(ActionEvent::ActionFailed { .. }) => EventSeverity::Error,
            CoreEvent::Action(ActionEvent::ActionDenied { .. }) => EventSeverity::Info,
            CoreEvent::Download(DownloadEvent::Reconciled { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Listing Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ListingEvent {
    /// A remote page was merged and published.
    PageLoaded {
        /// 1-based page number within the current browsing session
        page: u32,
        /// Items added to the listing by this page
        items: usize,
        has_more: bool,
    },
    /// A page fetch failed; previously shown items were kept.
    LoadFailed {
        /// Whether this was the first page of the session
        initial: bool,
        reason: String,
        retriable: bool,
    },
    /// An in-flight fetch was abandoned.
    LoadCancelled { initial: bool },
}

impl ListingEvent {
    fn description(&self) -> &str {
        match self {
            ListingEvent::PageLoaded { .. } => "Page loaded",
            ListingEvent::LoadFailed { .. } => "Page load failed",
            ListingEvent::LoadCancelled { .. } => "Page load cancelled",
        }
    }
}

// ============================================================================
// Download Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DownloadEvent {
    /// A download state transition was accepted and persisted.
    StateChanged {
        content_id: String,
        /// Stable state label (`not_downloaded`, `in_progress`, ...)
        state: String,
        /// Percent complete for in-progress transfers
        percent: Option<u8>,
    },
    /// The engine subscription dropped; the coordinator is reconnecting.
    EngineDisconnected {
        /// Delay before the next attempt, in milliseconds
        retry_in_ms: u64,
    },
    /// An engine update could not be written; it is retried before any
    /// later update is processed.
    PersistRetrying {
        content_id: String,
        error: String,
        /// Delay before the next attempt, in milliseconds
        retry_in_ms: u64,
    },
    /// Startup reconciliation of interrupted downloads finished.
    Reconciled {
        /// Stuck removals confirmed gone
        resolved: usize,
        /// Stuck removals handed back to the job queue
        requeued: usize,
        /// Lost transfers marked failed
        failed: usize,
    },
}

impl DownloadEvent {
    fn description(&self) -> &str {
        match self {
            DownloadEvent::StateChanged { .. } => "Download state changed",
            DownloadEvent::EngineDisconnected { .. } => "Download engine disconnected",
            DownloadEvent::PersistRetrying { .. } => "Download update write retrying",
            DownloadEvent::Reconciled { .. } => "Downloads reconciled",
        }
    }
}

// ============================================================================
// Action Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ActionEvent {
    BookmarkAdded { content_id: String },
    BookmarkRemoved { content_id: String },
    DownloadRequested { content_id: String },
    DownloadDeletionRequested { content_id: String },
    /// A precondition failed; nothing was written.
    ActionDenied { content_id: String, reason: String },
    /// The local write failed; the action was not applied.
    ActionFailed { content_id: String, message: String },
}

impl ActionEvent {
    fn description(&self) -> &str {
        match self {
            ActionEvent::BookmarkAdded { .. } => "Bookmark added",
            ActionEvent::BookmarkRemoved { .. } => "Bookmark removed",
            ActionEvent::DownloadRequested { .. } => "Download requested",
            ActionEvent::DownloadDeletionRequested { .. } => "Download deletion requested",
            ActionEvent::ActionDenied { .. } => "Action denied",
            ActionEvent::ActionFailed { .. } => "Action failed",
        }
    }

    /// Content the action targeted.
    pub fn content_id(&self) -> &str {
        match self {
            ActionEvent::BookmarkAdded { content_id }
            | ActionEvent::BookmarkRemoved { content_id }
            | ActionEvent::DownloadRequested { content_id }
            | ActionEvent::DownloadDeletionRequested { content_id }
            | ActionEvent::ActionDenied { content_id, .. }
            | ActionEvent::ActionFailed { content_id, .. } => content_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus clones the sender; every clone publishes to the same
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls more than `capacity` events behind receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Subscribes and wraps the receiver in an [`EventStream`].
    pub fn stream(&self) -> EventStream {
        EventStream::new(self.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let actions_only = bus.stream().filter(|event| matches!(event, CoreEvent::Action(_)));
/// # drop(actions_only);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from [`recv`](Self::recv).
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
