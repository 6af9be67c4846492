//! Local store trait and SQLite implementation
//!
//! Holds the two locally owned fields of every catalog item (bookmark flag and
//! download state) keyed by content id. Writes to one id are serialized so a
//! read-check-write never interleaves with another writer on the same record;
//! distinct ids proceed concurrently.

use crate::error::{LibraryError, Result};
use crate::models::{ContentId, DownloadState, LocalRecord};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

const COLUMNS: &str =
    "content_id, bookmarked, download_status, download_percent, created_at, updated_at";

/// SQLite caps bound parameters per statement; batch lookups stay below it.
const GET_MANY_CHUNK: usize = 500;

/// Lock entries are pruned once the map grows past this size.
const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Result of a conditional download state write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The new state was written
    Applied(LocalRecord),
    /// The record already held the requested state; nothing was written
    Unchanged(LocalRecord),
    /// The lifecycle rules forbid the step; nothing was written
    Rejected { current: DownloadState },
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Selection for [`LocalStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub bookmarked: Option<bool>,
    /// Match any of these states; the percentage of `InProgress` is ignored
    pub download_states: Vec<DownloadState>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn bookmarked() -> Self {
        Self {
            bookmarked: Some(true),
            ..Self::default()
        }
    }

    pub fn in_states(states: impl IntoIterator<Item = DownloadState>) -> Self {
        Self {
            bookmarked: None,
            download_states: states.into_iter().collect(),
        }
    }

    /// Everything with a download attached: queued, running, done, failed or
    /// being removed.
    pub fn downloads() -> Self {
        Self::in_states([
            DownloadState::Queued,
            DownloadState::InProgress(0),
            DownloadState::Completed,
            DownloadState::Failed,
            DownloadState::PendingRemoval,
        ])
    }

    fn status_labels(&self) -> Vec<&'static str> {
        let mut labels: Vec<&'static str> =
            self.download_states.iter().map(DownloadState::as_str).collect();
        labels.sort_unstable();
        labels.dedup();
        labels
    }
}

/// Local store interface
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Find the record for `id`
    ///
    /// # Returns
    /// - `Ok(Some(record))` if the id has local state
    /// - `Ok(None)` if it has never been written
    async fn get(&self, id: &ContentId) -> Result<Option<LocalRecord>>;

    /// Records for every id in `ids` that has local state.
    ///
    /// The map carries no order; callers keep their own.
    async fn get_many(&self, ids: &[ContentId]) -> Result<HashMap<ContentId, LocalRecord>>;

    async fn upsert_bookmark(&self, id: &ContentId, bookmarked: bool) -> Result<LocalRecord>;

    /// Flip the bookmark flag in one atomic step.
    async fn toggle_bookmark(&self, id: &ContentId) -> Result<LocalRecord>;

    /// Unconditionally write `state`.
    async fn upsert_download_state(&self, id: &ContentId, state: DownloadState)
        -> Result<LocalRecord>;

    /// Write `next` only if the current state may legally move to it.
    async fn transition_download_state(
        &self,
        id: &ContentId,
        next: DownloadState,
    ) -> Result<TransitionOutcome>;

    /// As [`transition_download_state`](Self::transition_download_state),
    /// but also rejected unless the current state is one of `from`.
    ///
    /// States are compared by kind; progress percentages are ignored.
    async fn transition_download_state_from(
        &self,
        id: &ContentId,
        from: &[DownloadState],
        next: DownloadState,
    ) -> Result<TransitionOutcome>;

    /// Delete the record for `id`
    ///
    /// # Returns
    /// - `Ok(true)` if a record was deleted
    /// - `Ok(false)` if there was none
    async fn remove(&self, id: &ContentId) -> Result<bool>;

    /// Records matching `filter`, oldest insertion first.
    async fn list(&self, filter: &RecordFilter, request: PageRequest) -> Result<Page<LocalRecord>>;
}

#[derive(sqlx::FromRow)]
struct LocalRecordRow {
    content_id: String,
    bookmarked: bool,
    download_status: String,
    download_percent: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<LocalRecordRow> for LocalRecord {
    type Error = LibraryError;

    fn try_from(row: LocalRecordRow) -> Result<Self> {
        let download_state = DownloadState::from_parts(&row.download_status, row.download_percent)
            .map_err(|e| LibraryError::CorruptRecord {
                content_id: row.content_id.clone(),
                message: e.to_string(),
            })?;

        Ok(Self {
            content_id: ContentId::new(row.content_id),
            bookmarked: row.bookmarked,
            download_state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Per-id async locks.
#[derive(Default)]
struct RecordLocks {
    inner: Mutex<HashMap<ContentId, Arc<AsyncMutex<()>>>>,
}

impl RecordLocks {
    async fn acquire(&self, id: &ContentId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            if map.len() > LOCK_PRUNE_THRESHOLD {
                map.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(map.entry(id.clone()).or_default())
        };
        lock.lock_owned().await
    }
}

/// SQLite implementation of [`LocalStore`]
pub struct SqliteLocalStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    locks: RecordLocks,
}

impl SqliteLocalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            clock,
            locks: RecordLocks::default(),
        }
    }

    async fn fetch(&self, id: &ContentId) -> Result<Option<LocalRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM local_records WHERE content_id = ?");
        let row = sqlx::query_as::<_, LocalRecordRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(LocalRecord::try_from).transpose()
    }

    async fn write_download_state(&self, id: &ContentId, state: DownloadState) -> Result<LocalRecord> {
        let now = self.clock.unix_timestamp_millis();
        let sql = format!(
            "INSERT INTO local_records \
                (content_id, download_status, download_percent, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(content_id) DO UPDATE SET \
                download_status = excluded.download_status, \
                download_percent = excluded.download_percent, \
                updated_at = excluded.updated_at \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, LocalRecordRow>(&sql)
            .bind(id.as_str())
            .bind(state.as_str())
            .bind(state.percent().map(i64::from))
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        LocalRecord::try_from(row)
    }

    async fn transition(
        &self,
        id: &ContentId,
        from: Option<&[DownloadState]>,
        next: DownloadState,
    ) -> Result<TransitionOutcome> {
        let _guard = self.locks.acquire(id).await;

        let existing = self.fetch(id).await?;
        let current = existing
            .as_ref()
            .map(|record| record.download_state)
            .unwrap_or_default();

        if let Some(from) = from {
            if !from.iter().any(|state| state.as_str() == current.as_str()) {
                debug!(
                    content_id = %id,
                    from = %current,
                    to = %next,
                    "Download transition outside permitted states"
                );
                return Ok(TransitionOutcome::Rejected { current });
            }
        }

        if current == next {

            let record = existing.unwrap_or_else(|| LocalRecord::empty(id.clone()));
            return Ok(TransitionOutcome::Unchanged(record));
        }

        if !current.can_transition_to(&next) {
            debug!(content_id = %id, from = %current, to = %next, "Download transition rejected");
            return Ok(TransitionOutcome::Rejected { current });
        }

        let record = self.write_download_state(id, next).await?;
        debug!(content_id = %id, from = %current, to = %next, "Download transition applied");
        Ok(TransitionOutcome::Applied(record))
    }

}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, id: &ContentId) -> Result<Option<LocalRecord>> {
        self.fetch(id).await
    }

    async fn get_many(&self, ids: &[ContentId]) -> Result<HashMap<ContentId, LocalRecord>> {
        let mut records = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(GET_MANY_CHUNK) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
                "SELECT {COLUMNS} FROM local_records WHERE content_id IN ("
            ));
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<LocalRecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                match LocalRecord::try_from(row) {
                    Ok(record) => {
                        records.insert(record.content_id.clone(), record);
                    }
                    Err(e) => warn!(error = %e, "Skipping unreadable local record"),
                }
            }
        }

        Ok(records)
    }

    async fn upsert_bookmark(&self, id: &ContentId, bookmarked: bool) -> Result<LocalRecord> {
        let _guard = self.locks.acquire(id).await;
        let now = self.clock.unix_timestamp_millis();
        let sql = format!(
            "INSERT INTO local_records (content_id, bookmarked, created_at, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(content_id) DO UPDATE SET \
                bookmarked = excluded.bookmarked, \
                updated_at = excluded.updated_at \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, LocalRecordRow>(&sql)
            .bind(id.as_str())
            .bind(bookmarked)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        debug!(content_id = %id, bookmarked, "Bookmark written");
        LocalRecord::try_from(row)
    }

    async fn toggle_bookmark(&self, id: &ContentId) -> Result<LocalRecord> {
        let _guard = self.locks.acquire(id).await;
        let now = self.clock.unix_timestamp_millis();
        let sql = format!(
            "INSERT INTO local_records (content_id, bookmarked, created_at, updated_at) \
             VALUES (?, 1, ?, ?) \
             ON CONFLICT(content_id) DO UPDATE SET \
                bookmarked = 1 - local_records.bookmarked, \
                updated_at = excluded.updated_at \
             RETURNING {COLUMNS}"
        );

        let row = sqlx::query_as::<_, LocalRecordRow>(&sql)
            .bind(id.as_str())
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        let record = LocalRecord::try_from(row)?;
        debug!(content_id = %id, bookmarked = record.bookmarked, "Bookmark toggled");
        Ok(record)
    }

    async fn upsert_download_state(
        &self,
        id: &ContentId,
        state: DownloadState,
    ) -> Result<LocalRecord> {
        let _guard = self.locks.acquire(id).await;
        let record = self.write_download_state(id, state).await?;
        debug!(content_id = %id, state = %state, "Download state written");
        Ok(record)
    }

    async fn transition_download_state(
        &self,
        id: &ContentId,
        next: DownloadState,
    ) -> Result<TransitionOutcome> {
        self.transition(id, None, next).await
    }

    async fn transition_download_state_from(
        &self,
        id: &ContentId,
        from: &[DownloadState],
        next: DownloadState,
    ) -> Result<TransitionOutcome> {
        self.transition(id, Some(from), next).await
    }

    async fn remove(&self, id: &ContentId) -> Result<bool> {
        let _guard = self.locks.acquire(id).await;
        let result = sqlx::query("DELETE FROM local_records WHERE content_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &RecordFilter, request: PageRequest) -> Result<Page<LocalRecord>> {
        let labels = filter.status_labels();

        let mut count: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM local_records");
        push_filter(&mut count, filter.bookmarked, &labels);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM local_records"));
        push_filter(&mut select, filter.bookmarked, &labels);
        select
            .push(" ORDER BY seq ASC LIMIT ")
            .push_bind(request.limit())
            .push(" OFFSET ")
            .push_bind(request.offset());

        let rows: Vec<LocalRecordRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(LocalRecord::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, total.max(0) as u64, request))
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, bookmarked: Option<bool>, labels: &[&'static str]) {
    let mut clause = " WHERE ";

    if let Some(bookmarked) = bookmarked {
        builder.push(clause).push("bookmarked = ").push_bind(bookmarked);
        clause = " AND ";
    }

    if !labels.is_empty() {
        builder.push(clause).push("download_status IN (");
        let mut separated = builder.separated(", ");
        for label in labels {
            separated.push_bind(*label);
        }
        separated.push_unseparated(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Clock pinned to a settable millisecond timestamp.
    struct FixedClock(AtomicI64);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            DateTime::from_timestamp_millis(self.0.load(Ordering::SeqCst)).unwrap_or_default()
        }
    }

    async fn store() -> SqliteLocalStore {
        SqliteLocalStore::new(create_test_pool().await.unwrap())
    }

    fn id(value: &str) -> ContentId {
        ContentId::new(value)
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let store = store().await;
        assert!(store.get(&id("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_toggle_bookmark_twice_restores_original() {
        let store = store().await;
        store.upsert_bookmark(&id("1"), false).await.unwrap();

        assert!(store.toggle_bookmark(&id("1")).await.unwrap().bookmarked);
        assert!(!store.toggle_bookmark(&id("1")).await.unwrap().bookmarked);
        assert!(!store.get(&id("1")).await.unwrap().unwrap().bookmarked);
    }

    #[tokio::test]
    async fn test_toggle_creates_bookmarked_record() {
        let store = store().await;
        let record = store.toggle_bookmark(&id("new")).await.unwrap();
        assert!(record.bookmarked);
        assert_eq!(record.download_state, DownloadState::NotDownloaded);
    }

    #[tokio::test]
    async fn test_bookmark_and_download_fields_are_independent() {
        let store = store().await;
        store
            .upsert_download_state(&id("5"), DownloadState::in_progress(40))
            .await
            .unwrap();
        store.upsert_bookmark(&id("5"), true).await.unwrap();

        let record = store.get(&id("5")).await.unwrap().unwrap();
        assert!(record.bookmarked);
        assert_eq!(record.download_state, DownloadState::InProgress(40));
    }

    #[tokio::test]
    async fn test_get_many_returns_only_known_ids() {
        let store = store().await;
        store
            .upsert_download_state(&id("42"), DownloadState::Completed)
            .await
            .unwrap();
        store.upsert_bookmark(&id("43"), true).await.unwrap();

        let records = store
            .get_many(&[id("41"), id("42"), id("43")])
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[&id("42")].download_state, DownloadState::Completed);
        assert!(records[&id("43")].bookmarked);
        assert!(store.get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_many_spans_chunks() {
        let store = store().await;
        let ids: Vec<ContentId> = (0..(GET_MANY_CHUNK + 20)).map(|n| ContentId::from(n as u64)).collect();
        store.upsert_bookmark(&ids[0], true).await.unwrap();
        store.upsert_bookmark(&ids[GET_MANY_CHUNK + 10], true).await.unwrap();

        let records = store.get_many(&ids).await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_transition_rejects_completed_after_pending_removal() {
        let store = store().await;
        store
            .upsert_download_state(&id("42"), DownloadState::Completed)
            .await
            .unwrap();

        let outcome = store
            .transition_download_state(&id("42"), DownloadState::PendingRemoval)
            .await
            .unwrap();
        assert!(outcome.is_applied());

        let outcome = store
            .transition_download_state(&id("42"), DownloadState::Completed)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                current: DownloadState::PendingRemoval
            }
        );

        let outcome = store
            .transition_download_state(&id("42"), DownloadState::NotDownloaded)
            .await
            .unwrap();
        assert!(outcome.is_applied());
    }

    #[tokio::test]
    async fn test_guarded_transition_checks_current_state() {
        let store = store().await;
        let restartable = [DownloadState::NotDownloaded, DownloadState::Failed];

        let outcome = store
            .transition_download_state_from(&id("1"), &restartable, DownloadState::Queued)
            .await
            .unwrap();
        assert!(outcome.is_applied());

        // Completed -> Queued is a legal move, but not from this guard.
        store
            .upsert_download_state(&id("2"), DownloadState::Completed)
            .await
            .unwrap();
        let outcome = store
            .transition_download_state_from(&id("2"), &restartable, DownloadState::Queued)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            TransitionOutcome::Rejected {
                current: DownloadState::Completed
            }
        );
        let record = store.get(&id("2")).await.unwrap().unwrap();
        assert_eq!(record.download_state, DownloadState::Completed);

        store
            .upsert_download_state(&id("3"), DownloadState::InProgress(40))
            .await
            .unwrap();
        let outcome = store
            .transition_download_state_from(
                &id("3"),
                &[DownloadState::InProgress(0)],
                DownloadState::Failed,
            )
            .await
            .unwrap();
        assert!(outcome.is_applied());
    }

    #[tokio::test]
    async fn test_transition_to_same_state_writes_nothing() {
        let store = store().await;
        let outcome = store
            .transition_download_state(&id("9"), DownloadState::NotDownloaded)
            .await
            .unwrap();

        assert!(matches!(outcome, TransitionOutcome::Unchanged(_)));
        assert!(store.get(&id("9")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_progress_never_goes_backwards() {
        let store = Arc::new(store().await);
        let target = id("7");
        store
            .upsert_download_state(&target, DownloadState::Queued)
            .await
            .unwrap();

        let handles: Vec<_> = [30u8, 90, 10, 60, 100, 20]
            .into_iter()
            .map(|percent| {
                let store = Arc::clone(&store);
                let target = target.clone();
                tokio::spawn(async move {
                    store
                        .transition_download_state(&target, DownloadState::InProgress(percent))
                        .await
                        .unwrap()
                })
            })
            .collect();

        for outcome in futures::future::join_all(handles).await {
            outcome.unwrap();
        }

        let record = store.get(&target).await.unwrap().unwrap();
        assert_eq!(record.download_state, DownloadState::InProgress(100));
    }

    #[tokio::test]
    async fn test_remove_reports_presence() {
        let store = store().await;
        store.upsert_bookmark(&id("3"), true).await.unwrap();

        assert!(store.remove(&id("3")).await.unwrap());
        assert!(!store.remove(&id("3")).await.unwrap());
        assert!(store.get(&id("3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_in_insertion_order_with_filters() {
        let store = store().await;
        store
            .upsert_download_state(&id("c"), DownloadState::Completed)
            .await
            .unwrap();
        store.upsert_bookmark(&id("a"), true).await.unwrap();
        store
            .upsert_download_state(&id("b"), DownloadState::PendingRemoval)
            .await
            .unwrap();
        // Updating an existing record keeps its position.
        store.upsert_bookmark(&id("c"), true).await.unwrap();

        let all = store.list(&RecordFilter::all(), PageRequest::new(0, 10)).await.unwrap();
        let order: Vec<&str> = all.items.iter().map(|r| r.content_id.as_str()).collect();
        assert_eq!(order, vec!["c", "a", "b"]);

        let bookmarked = store
            .list(&RecordFilter::bookmarked(), PageRequest::new(0, 10))
            .await
            .unwrap();
        assert_eq!(bookmarked.total, 2);

        let downloads = store
            .list(&RecordFilter::downloads(), PageRequest::new(0, 1))
            .await
            .unwrap();
        assert_eq!(downloads.total, 2);
        assert_eq!(downloads.items.len(), 1);
        assert_eq!(downloads.items[0].content_id, id("c"));
        assert!(downloads.has_next());

        let pending = store
            .list(
                &RecordFilter::in_states([DownloadState::PendingRemoval]),
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(pending.items.len(), 1);
        assert_eq!(pending.items[0].content_id, id("b"));
    }

    #[tokio::test]
    async fn test_timestamps_come_from_clock() {
        let clock = Arc::new(FixedClock(AtomicI64::new(1_000)));
        let store = SqliteLocalStore::with_clock(create_test_pool().await.unwrap(), clock.clone());

        let created = store.upsert_bookmark(&id("1"), true).await.unwrap();
        assert_eq!(created.created_at, 1_000);

        clock.0.store(5_000, Ordering::SeqCst);
        let updated = store.toggle_bookmark(&id("1")).await.unwrap();
        assert_eq!(updated.created_at, 1_000);
        assert_eq!(updated.updated_at, 5_000);
    }
}
