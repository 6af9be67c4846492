//! Local-change signalling.
//!
//! Action delegates call [`BoundaryNotifier::notify`] after writing to the
//! local store; the sync engine listens and re-overlays the affected items
//! without touching the network.

use core_library::ContentId;
use tokio::sync::broadcast;
use tracing::trace;

/// Default capacity of the boundary channel
pub const DEFAULT_BOUNDARY_BUFFER_SIZE: usize = 64;

/// What changed locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryChange {
    Ids(Vec<ContentId>),
    /// Unknown extent; re-overlay everything in view
    All,
}

impl BoundaryChange {
    pub fn single(id: ContentId) -> Self {
        Self::Ids(vec![id])
    }

    pub fn touches(&self, id: &ContentId) -> bool {
        match self {
            Self::Ids(ids) => ids.contains(id),
            Self::All => true,
        }
    }
}

/// Cloneable sender side of the boundary channel.
#[derive(Debug, Clone)]
pub struct BoundaryNotifier {
    sender: broadcast::Sender<BoundaryChange>,
}

impl BoundaryNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Signal that local state for `id` changed.
    pub fn notify(&self, id: &ContentId) {
        self.send(BoundaryChange::single(id.clone()));
    }

    pub fn notify_many(&self, ids: Vec<ContentId>) {
        if !ids.is_empty() {
            self.send(BoundaryChange::Ids(ids));
        }
    }

    pub fn notify_all(&self) {
        self.send(BoundaryChange::All);
    }

    /// Receivers that fall behind get `RecvError::Lagged`, which listeners
    /// treat as [`BoundaryChange::All`].
    pub fn subscribe(&self) -> broadcast::Receiver<BoundaryChange> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, change: BoundaryChange) {
        // Nobody listening means nothing is in view.
        if self.sender.send(change).is_err() {
            trace!("Boundary change dropped: no listeners");
        }
    }
}

impl Default for BoundaryNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_BOUNDARY_BUFFER_SIZE)
    }
}
