//! Download and delete actions.
//!
//! The permission check runs before anything touches the store, so a denied
//! request leaves no trace besides the returned report.

use super::{ActionKind, ActionOutcome, ActionReport, ActionRun, DenialReason};
use crate::Result;
use bridge_traits::DownloadPermission;
use core_download::DownloadCoordinator;
use core_library::{ContentId, DownloadState, LocalStore, TransitionOutcome};
use core_runtime::events::{ActionEvent, EventBus};
use core_sync::BoundaryNotifier;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// States from which a download may be (re)started
const RESTARTABLE: [DownloadState; 2] = [DownloadState::NotDownloaded, DownloadState::Failed];

pub struct DownloadActionDelegate {
    store: Arc<dyn LocalStore>,
    coordinator: Arc<DownloadCoordinator>,
    permission: Arc<dyn DownloadPermission>,
    notifier: BoundaryNotifier,
    event_bus: Option<EventBus>,
}

impl DownloadActionDelegate {
    pub fn new(
        store: Arc<dyn LocalStore>,
        coordinator: Arc<DownloadCoordinator>,
        permission: Arc<dyn DownloadPermission>,
        notifier: BoundaryNotifier,
    ) -> Self {
        Self {
            store,
            coordinator,
            permission,
            notifier,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    fn begin(&self, id: &ContentId, kind: ActionKind) -> ActionRun<'_> {
        ActionRun::begin(id, kind, &self.notifier, self.event_bus.as_ref())
    }

    /// Request a download of `id`.
    ///
    /// Denied without side effects when the host refuses the download or the
    /// item is already queued, downloading, downloaded or being removed.
    /// A hand-off failure is not an error: the item is recorded as `Failed`
    /// and the report says [`ActionOutcome::DownloadFailed`].
    ///
    /// # Errors
    ///
    /// Local store write failures.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn start_download(&self, id: &ContentId) -> Result<ActionReport> {
        let mut run = self.begin(id, ActionKind::StartDownload);

        if !self.permission.can_download() {
            let reason = DenialReason::from(self.permission.denial_reason());
            return Ok(run.deny(reason));
        }

        // Checked and written under the store's per-record lock.
        match self
            .store
            .transition_download_state_from(id, &RESTARTABLE, DownloadState::Queued)
            .await
        {
            Ok(TransitionOutcome::Applied(_) | TransitionOutcome::Unchanged(_)) => {}
            Ok(TransitionOutcome::Rejected { current }) => {
                return Ok(run.deny(DenialReason::InvalidState(current)));
            }
            Err(e) => {
                warn!(error = %e, "Failed to queue download");
                run.fail(&e);
                return Err(e.into());
            }
        }
        run.applied();

        let content_id = id.to_string();
        let report = match self.coordinator.enqueue_download(id).await {
            Ok(()) => {
                info!("Download queued");
                run.notify(
                    ActionOutcome::DownloadQueued,
                    ActionEvent::DownloadRequested { content_id },
                )
            }
            Err(e) => {
                warn!(error = %e, "Download could not be handed off");
                run.notify(
                    ActionOutcome::DownloadFailed,
                    ActionEvent::ActionFailed {
                        content_id,
                        message: e.to_string(),
                    },
                )
            }
        };
        Ok(report)
    }

    /// Request deletion of the downloaded artifact for `id`.
    ///
    /// The item moves to `PendingRemoval` immediately and only resolves to
    /// `NotDownloaded` once the engine reports the artifact gone. If the
    /// removal job cannot be handed off the item stays pending and the report
    /// says [`ActionOutcome::RemovalDeferred`].
    ///
    /// # Errors
    ///
    /// Local store read or write failures.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn delete_download(&self, id: &ContentId) -> Result<ActionReport> {
        let mut run = self.begin(id, ActionKind::DeleteDownload);

        let current = match self.store.get(id).await {
            Ok(record) => record.map(|r| r.download_state).unwrap_or_default(),
            Err(e) => {
                run.fail(&e);
                return Err(e.into());
            }
        };
        if current == DownloadState::NotDownloaded {
            return Ok(run.deny(DenialReason::InvalidState(current)));
        }

        if current != DownloadState::PendingRemoval {
            match self
                .store
                .transition_download_state(id, DownloadState::PendingRemoval)
                .await
            {
                Ok(TransitionOutcome::Applied(_) | TransitionOutcome::Unchanged(_)) => {}
                Ok(TransitionOutcome::Rejected { current }) => {
                    return Ok(run.deny(DenialReason::InvalidState(current)));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to mark removal pending");
                    run.fail(&e);
                    return Err(e.into());
                }
            }
        }
        run.applied();

        let outcome = match self.coordinator.enqueue_removal(id).await {
            Ok(()) => ActionOutcome::RemovalQueued,
            Err(e) => {
                warn!(error = %e, "Removal deferred");
                ActionOutcome::RemovalDeferred
            }
        };
        Ok(run.notify(
            outcome,
            ActionEvent::DownloadDeletionRequested {
                content_id: id.to_string(),
            },
        ))
    }
}
