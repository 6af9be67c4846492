//! Progress fan-out types.

use core_library::{ContentId, DownloadState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

/// Default capacity of the progress channel
pub const DEFAULT_PROGRESS_BUFFER_SIZE: usize = 256;

/// An accepted, persisted download state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub content_id: ContentId,
    pub state: DownloadState,
}

impl DownloadProgress {
    pub fn new(content_id: ContentId, state: DownloadState) -> Self {
        Self { content_id, state }
    }
}

/// One consumer's view of the progress channel.
///
/// Updates for a single id arrive in the order they were persisted. The
/// stream stays open for as long as the coordinator lives, across engine
/// reconnects.
pub struct ProgressStream {
    receiver: broadcast::Receiver<DownloadProgress>,
}

impl ProgressStream {
    pub(crate) fn new(receiver: broadcast::Receiver<DownloadProgress>) -> Self {
        Self { receiver }
    }

    /// Next progress update.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` when this consumer fell `n` updates behind; the
    /// skipped states are already in the local store. `RecvError::Closed`
    /// once the coordinator is gone.
    pub async fn recv(&mut self) -> Result<DownloadProgress, RecvError> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Result<DownloadProgress, TryRecvError> {
        self.receiver.try_recv()
    }
}
