//! Domain models for the content library
//!
//! Remote-owned attributes arrive as [`RemoteContent`]; the two locally owned
//! fields live in [`LocalRecord`]. A [`ContentItem`] is the value produced by
//! overlaying one onto the other, recreated on every merge.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{LibraryError, Result};

pub use bridge_traits::catalog::{ContentId, RemoteContent};

// =============================================================================
// Download state
// =============================================================================

/// Download lifecycle of a single item as seen by the core.
///
/// The download engine's richer vocabulary is mapped onto these six states
/// before it reaches the store or the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "percent", rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotDownloaded,
    Queued,
    /// Percent complete, `0..=100`
    InProgress(u8),
    Completed,
    Failed,
    /// Delete requested, removal not yet confirmed by the engine
    PendingRemoval,
}

impl DownloadState {
    /// In-progress state with the percentage clamped to 100.
    pub fn in_progress(percent: u8) -> Self {
        Self::InProgress(percent.min(100))
    }

    /// Stable label used in storage and events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotDownloaded => "not_downloaded",
            Self::Queued => "queued",
            Self::InProgress(_) => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::PendingRemoval => "pending_removal",
        }
    }

    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::InProgress(percent) => Some(*percent),
            _ => None,
        }
    }

    /// Rebuild a state from its stored label and percentage column.
    pub fn from_parts(status: &str, percent: Option<i64>) -> Result<Self> {
        let state = match status {
            "not_downloaded" => Self::NotDownloaded,
            "queued" => Self::Queued,
            "in_progress" => {
                let percent = percent.unwrap_or(0).clamp(0, 100) as u8;
                Self::InProgress(percent)
            }
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "pending_removal" => Self::PendingRemoval,
            other => {
                return Err(LibraryError::InvalidInput {
                    field: "download_status".to_string(),
                    message: format!("unknown download status '{other}'"),
                })
            }
        };
        Ok(state)
    }

    /// `Completed` or `Failed`: no further engine updates until a new action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// A transfer is queued or running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress(_))
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// Repeating the current state is accepted. Progress may not go
    /// backwards, and a pending removal only resolves to `NotDownloaded`.
    pub fn can_transition_to(&self, next: &DownloadState) -> bool {
        use DownloadState::*;

        match (self, next) {
            (InProgress(current), InProgress(next)) => next >= current,
            (current, next) if current == next => true,
            (NotDownloaded, Queued | InProgress(_) | Completed | Failed) => true,
            (Queued, InProgress(_) | Completed | Failed | NotDownloaded | PendingRemoval) => true,
            (InProgress(_), Completed | Failed | NotDownloaded | PendingRemoval) => true,
            (Completed | Failed, Queued | NotDownloaded | PendingRemoval) => true,
            (PendingRemoval, NotDownloaded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress(percent) => write!(f, "in_progress({percent}%)"),
            other => f.write_str(other.as_str()),
        }
    }
}

// =============================================================================
// Local record
// =============================================================================

/// Persisted local state for one content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub content_id: ContentId,
    pub bookmarked: bool,
    pub download_state: DownloadState,
    /// Unix timestamp (milliseconds) of first insertion
    pub created_at: i64,
    /// Unix timestamp (milliseconds) of last write
    pub updated_at: i64,
}

impl LocalRecord {
    /// Record for an id that has no stored state yet.
    pub fn empty(content_id: ContentId) -> Self {
        Self {
            content_id,
            bookmarked: false,
            download_state: DownloadState::NotDownloaded,
            created_at: 0,
            updated_at: 0,
        }
    }
}

// =============================================================================
// Merged item
// =============================================================================

/// A remote item with the local fields overlaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub remote: RemoteContent,
    pub bookmarked: bool,
    pub download_state: DownloadState,
}

impl ContentItem {
    /// Overlay `local` onto `remote`. Missing local state means defaults.
    pub fn overlay(remote: RemoteContent, local: Option<&LocalRecord>) -> Self {
        match local {
            Some(record) => Self {
                remote,
                bookmarked: record.bookmarked,
                download_state: record.download_state,
            },
            None => Self::from_remote(remote),
        }
    }

    pub fn from_remote(remote: RemoteContent) -> Self {
        Self {
            remote,
            bookmarked: false,
            download_state: DownloadState::NotDownloaded,
        }
    }

    pub fn id(&self) -> &ContentId {
        &self.remote.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DownloadState::*;

    #[test]
    fn test_pending_removal_never_becomes_completed() {
        assert!(!PendingRemoval.can_transition_to(&Completed));
        assert!(!PendingRemoval.can_transition_to(&InProgress(50)));
        assert!(!PendingRemoval.can_transition_to(&Queued));
        assert!(PendingRemoval.can_transition_to(&NotDownloaded));
        assert!(PendingRemoval.can_transition_to(&PendingRemoval));
    }

    #[test]
    fn test_progress_is_monotonic_within_an_attempt() {
        assert!(InProgress(10).can_transition_to(&InProgress(10)));
        assert!(InProgress(10).can_transition_to(&InProgress(80)));
        assert!(!InProgress(80).can_transition_to(&InProgress(10)));
        assert!(InProgress(80).can_transition_to(&Completed));
        assert!(!Completed.can_transition_to(&InProgress(10)));
    }

    #[test]
    fn test_terminal_states_allow_retry_or_removal() {
        for terminal in [Completed, Failed] {
            assert!(terminal.can_transition_to(&Queued));
            assert!(terminal.can_transition_to(&NotDownloaded));
            assert!(terminal.can_transition_to(&PendingRemoval));
        }
        assert!(!NotDownloaded.can_transition_to(&PendingRemoval));
    }

    #[test]
    fn test_storage_labels_round_trip() {
        for state in [
            NotDownloaded,
            Queued,
            InProgress(42),
            Completed,
            Failed,
            PendingRemoval,
        ] {
            let restored =
                DownloadState::from_parts(state.as_str(), state.percent().map(i64::from)).unwrap();
            assert_eq!(restored, state);
        }
        assert!(DownloadState::from_parts("paused", None).is_err());
    }

    #[test]
    fn test_in_progress_clamps_percent() {
        assert_eq!(DownloadState::in_progress(250), InProgress(100));
        assert_eq!(DownloadState::from_parts("in_progress", Some(-5)).unwrap(), InProgress(0));
    }

    #[test]
    fn test_download_state_serialization() {
        let json = serde_json::to_value(InProgress(30)).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["percent"], 30);
        assert_eq!(serde_json::to_value(Completed).unwrap()["status"], "completed");
    }

    #[test]
    fn test_overlay_keeps_remote_attributes() {
        let remote = RemoteContent::new("42", "Intro to Ownership").with_duration(900);
        let record = LocalRecord {
            content_id: ContentId::new("42"),
            bookmarked: true,
            download_state: Completed,
            created_at: 1,
            updated_at: 2,
        };

        let item = ContentItem::overlay(remote.clone(), Some(&record));
        assert_eq!(item.remote, remote);
        assert!(item.bookmarked);
        assert_eq!(item.download_state, Completed);

        let bare = ContentItem::overlay(remote, None);
        assert!(!bare.bookmarked);
        assert_eq!(bare.download_state, NotDownloaded);
    }
}
