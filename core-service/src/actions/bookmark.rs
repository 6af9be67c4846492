//! Bookmark actions.

use super::{ActionKind, ActionOutcome, ActionReport, ActionRun};
use crate::Result;
use core_library::{ContentId, LocalRecord, LocalStore};
use core_runtime::events::{ActionEvent, EventBus};
use core_sync::BoundaryNotifier;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Writes bookmark flags and signals the listing.
pub struct BookmarkActionDelegate {
    store: Arc<dyn LocalStore>,
    notifier: BoundaryNotifier,
    event_bus: Option<EventBus>,
}

impl BookmarkActionDelegate {
    pub fn new(store: Arc<dyn LocalStore>, notifier: BoundaryNotifier) -> Self {
        Self {
            store,
            notifier,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Flip the bookmark flag of `id`.
    ///
    /// # Errors
    ///
    /// A local store write failure; nothing is notified.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn toggle_bookmark(&self, id: &ContentId) -> Result<ActionReport> {
        let mut run = ActionRun::begin(
            id,
            ActionKind::ToggleBookmark,
            &self.notifier,
            self.event_bus.as_ref(),
        );

        let written = self.store.toggle_bookmark(id).await;
        let record = self.applied(&mut run, written)?;
        Ok(Self::finish(run, &record))
    }

    /// Set the bookmark flag of `id` to `bookmarked`.
    #[instrument(skip(self), fields(content_id = %id))]
    pub async fn set_bookmark(&self, id: &ContentId, bookmarked: bool) -> Result<ActionReport> {
        let mut run = ActionRun::begin(
            id,
            ActionKind::SetBookmark,
            &self.notifier,
            self.event_bus.as_ref(),
        );

        let written = self.store.upsert_bookmark(id, bookmarked).await;
        let record = self.applied(&mut run, written)?;
        Ok(Self::finish(run, &record))
    }

    fn applied(
        &self,
        run: &mut ActionRun<'_>,
        written: core_library::Result<LocalRecord>,
    ) -> Result<LocalRecord> {
        match written {
            Ok(record) => {
                run.applied();
                Ok(record)
            }
            Err(e) => {
                warn!(content_id = %run.content_id(), error = %e, "Bookmark write failed");
                run.fail(&e);
                Err(e.into())
            }
        }
    }

    fn finish(run: ActionRun<'_>, record: &LocalRecord) -> ActionReport {
        let content_id = record.content_id.to_string();
        let event = if record.bookmarked {
            ActionEvent::BookmarkAdded { content_id }
        } else {
            ActionEvent::BookmarkRemoved { content_id }
        };
        run.notify(ActionOutcome::Bookmarked(record.bookmarked), event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionPhase;
    use core_library::db::create_test_pool;
    use core_library::SqliteLocalStore;

    async fn delegate() -> (BookmarkActionDelegate, Arc<SqliteLocalStore>, BoundaryNotifier) {
        let store = Arc::new(SqliteLocalStore::new(create_test_pool().await.unwrap()));
        let notifier = BoundaryNotifier::default();
        let delegate = BookmarkActionDelegate::new(store.clone(), notifier.clone());
        (delegate, store, notifier)
    }

    #[tokio::test]
    async fn test_toggle_writes_and_notifies() {
        let (delegate, store, notifier) = delegate().await;
        let mut listener = notifier.subscribe();

        let report = delegate.toggle_bookmark(&ContentId::new("3")).await.unwrap();

        assert_eq!(report.phase, ActionPhase::Notified);
        assert_eq!(report.outcome, ActionOutcome::Bookmarked(true));
        assert!(store.get(&ContentId::new("3")).await.unwrap().unwrap().bookmarked);
        assert!(listener.try_recv().is_ok());
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_set_bookmark_is_idempotent() {
        let (delegate, store, _notifier) = delegate().await;
        let id = ContentId::new("8");

        delegate.set_bookmark(&id, true).await.unwrap();
        let report = delegate.set_bookmark(&id, true).await.unwrap();

        assert_eq!(report.outcome, ActionOutcome::Bookmarked(true));
        assert!(store.get(&id).await.unwrap().unwrap().bookmarked);
    }
}
