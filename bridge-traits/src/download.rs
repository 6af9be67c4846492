//! Download Engine Abstractions
//!
//! The download engine owns the actual transfer of media bytes, including its
//! own retry and backoff. It speaks its own state vocabulary
//! ([`TransferState`]); the core maps that vocabulary onto its smaller download
//! state set at the coordinator boundary and never exposes it further.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{catalog::ContentId, error::Result};

/// Engine-native transfer state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TransferState {
    /// Waiting for a transfer slot
    Queued,
    /// Re-queued after the engine restarted
    Restarting,
    /// Paused by the engine (network lost, requirements not met)
    Stopped { reason: String },
    /// Bytes are flowing
    Downloading {
        downloaded_bytes: u64,
        total_bytes: Option<u64>,
    },
    Completed,
    Failed { reason: String },
    /// Artifact deletion in progress
    Removing,
    /// Artifact no longer present on disk
    Removed,
}

impl TransferState {
    /// Whether the engine will emit no further updates for this transfer.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. } | Self::Removed)
    }
}

/// A single progress callback from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUpdate {
    pub content_id: ContentId,
    pub state: TransferState,
}

impl TransferUpdate {
    pub fn new(content_id: impl Into<ContentId>, state: TransferState) -> Self {
        Self {
            content_id: content_id.into(),
            state,
        }
    }
}

/// Stream of engine updates.
///
/// Ordered per content id. `None` means the engine connection was lost;
/// the consumer is expected to resubscribe.
#[async_trait]
pub trait TransferUpdateStream: Send {
    async fn next_update(&mut self) -> Option<TransferUpdate>;
}

/// Download engine trait
///
/// Abstracts the host download subsystem:
/// - **Android**: a platform download manager bound to a foreground service
/// - **Desktop**: an HTTP range-request worker pool
/// - **Tests**: [`ChannelDownloadEngine`](crate::testing::ChannelDownloadEngine)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::download::DownloadEngine;
///
/// async fn watch(engine: &dyn DownloadEngine) -> Result<()> {
///     let mut updates = engine.subscribe().await?;
///     while let Some(update) = updates.next_update().await {
///         println!("{} -> {:?}", update.content_id, update.state);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    /// Begin (or resume) the transfer for `id`
    async fn start(&self, id: &ContentId) -> Result<()>;

    /// Delete the downloaded artifact for `id`, cancelling any transfer
    async fn remove(&self, id: &ContentId) -> Result<()>;

    /// Current engine-side state for `id`, `None` when the engine has no record
    async fn transfer_status(&self, id: &ContentId) -> Result<Option<TransferState>>;

    /// Open a new progress subscription
    async fn subscribe(&self) -> Result<Box<dyn TransferUpdateStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Removed.is_terminal());
        assert!(TransferState::Failed {
            reason: "disk full".into()
        }
        .is_terminal());
        assert!(!TransferState::Removing.is_terminal());
        assert!(!TransferState::Downloading {
            downloaded_bytes: 10,
            total_bytes: None
        }
        .is_terminal());
    }

    #[test]
    fn test_transfer_state_serialization() {
        let json = serde_json::to_value(TransferState::Downloading {
            downloaded_bytes: 5,
            total_bytes: Some(10),
        })
        .unwrap();
        assert_eq!(json["state"], "downloading");
        assert_eq!(json["downloaded_bytes"], 5);
    }
}
