//! # User Actions
//!
//! Each action runs as `Requested -> Applied -> Notified`:
//!
//! 1. **Requested**: preconditions are checked. A failed check ends the
//!    action as [`ActionOutcome::Denied`] with nothing written.
//! 2. **Applied**: the local store is written and, for downloads, the
//!    coordinator is called. A store write failure is returned as an error
//!    and the action never reaches this phase.
//! 3. **Notified**: the [`BoundaryNotifier`](core_sync::BoundaryNotifier) is
//!    signalled exactly once so the listing re-overlays the item.

pub mod bookmark;
pub mod download;

pub use bookmark::BookmarkActionDelegate;
pub use download::DownloadActionDelegate;

use bridge_traits::permission::PermissionDenial;
use core_library::{ContentId, DownloadState};
use core_runtime::events::{ActionEvent, CoreEvent, EventBus};
use core_sync::BoundaryNotifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Requested,
    Applied,
    Notified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ToggleBookmark,
    SetBookmark,
    StartDownload,
    DeleteDownload,
}

/// Why an action was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    NoActiveSubscription,
    StoragePermissionMissing,
    /// The item's download state does not allow the action
    InvalidState(DownloadState),
}

impl From<PermissionDenial> for DenialReason {
    fn from(denial: PermissionDenial) -> Self {
        match denial {
            PermissionDenial::NoActiveSubscription => Self::NoActiveSubscription,
            PermissionDenial::StoragePermissionMissing => Self::StoragePermissionMissing,
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveSubscription => f.write_str("no active subscription"),
            Self::StoragePermissionMissing => f.write_str("storage permission missing"),
            Self::InvalidState(state) => write!(f, "not allowed while {state}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionOutcome {
    /// New bookmark flag
    Bookmarked(bool),
    DownloadQueued,
    /// The job could not be handed off; the item is now `Failed`
    DownloadFailed,
    RemovalQueued,
    /// The removal job could not be handed off; the item stays
    /// `PendingRemoval` until the next reconciliation
    RemovalDeferred,
    Denied(DenialReason),
}

/// Result of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    pub content_id: ContentId,
    pub kind: ActionKind,
    /// Last phase reached
    pub phase: ActionPhase,
    pub outcome: ActionOutcome,
}

impl ActionReport {
    pub fn is_denied(&self) -> bool {
        matches!(self.outcome, ActionOutcome::Denied(_))
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self.outcome {
            ActionOutcome::Denied(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Phase tracker for one action in progress.
pub(crate) struct ActionRun<'a> {
    content_id: ContentId,
    kind: ActionKind,
    phase: ActionPhase,
    notifier: &'a BoundaryNotifier,
    event_bus: Option<&'a EventBus>,
}

impl<'a> ActionRun<'a> {
    pub(crate) fn begin(
        content_id: &ContentId,
        kind: ActionKind,
        notifier: &'a BoundaryNotifier,
        event_bus: Option<&'a EventBus>,
    ) -> Self {
        debug!(content_id = %content_id, ?kind, "Action requested");
        Self {
            content_id: content_id.clone(),
            kind,
            phase: ActionPhase::Requested,
            notifier,
            event_bus,
        }
    }

    pub(crate) fn content_id(&self) -> &ContentId {
        &self.content_id
    }

    /// End the action before anything was written.
    pub(crate) fn deny(self, reason: DenialReason) -> ActionReport {
        debug!(content_id = %self.content_id, kind = ?self.kind, %reason, "Action denied");
        self.emit(ActionEvent::ActionDenied {
            content_id: self.content_id.to_string(),
            reason: reason.to_string(),
        });
        self.report(ActionOutcome::Denied(reason))
    }

    /// Report a failed local write. The action stays `Requested`.
    pub(crate) fn fail(&self, message: impl fmt::Display) {
        self.emit(ActionEvent::ActionFailed {
            content_id: self.content_id.to_string(),
            message: message.to_string(),
        });
    }

    pub(crate) fn applied(&mut self) {
        self.phase = ActionPhase::Applied;
    }

    /// Signal the boundary once and finish.
    pub(crate) fn notify(mut self, outcome: ActionOutcome, event: ActionEvent) -> ActionReport {
        debug_assert_eq!(self.phase, ActionPhase::Applied);
        self.notifier.notify(&self.content_id);
        self.phase = ActionPhase::Notified;
        self.emit(event);
        debug!(content_id = %self.content_id, kind = ?self.kind, ?outcome, "Action notified");
        self.report(outcome)
    }

    fn emit(&self, event: ActionEvent) {
        if let Some(bus) = self.event_bus {
            bus.emit(CoreEvent::Action(event)).ok();
        }
    }

    fn report(self, outcome: ActionOutcome) -> ActionReport {
        ActionReport {
            content_id: self.content_id,
            kind: self.kind,
            phase: self.phase,
            outcome,
        }
    }
}
