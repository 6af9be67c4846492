//! Session wiring.

use crate::actions::{ActionReport, BookmarkActionDelegate, DownloadActionDelegate};
use crate::Result;
use core_download::{DownloadCoordinator, ReconcileReport};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::{ContentId, LocalRecord, LocalStore, Page, PageRequest, RecordFilter, SqliteLocalStore};
use core_runtime::config::{CoreConfig, DatabaseLocation};
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::strip_path;
use core_sync::{BoundaryNotifier, ContentSyncEngine, LoadStatus, MergedListing};
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

/// One running content screen: listing, downloads and actions over a shared
/// local store.
///
/// Dropping the session cancels its background tasks; call
/// [`shutdown`](Self::shutdown) to also wait for them and close the database.
pub struct ContentSession {
    pool: Pool<Sqlite>,
    store: Arc<SqliteLocalStore>,
    event_bus: EventBus,
    coordinator: Arc<DownloadCoordinator>,
    engine: ContentSyncEngine,
    bookmarks: BookmarkActionDelegate,
    downloads: DownloadActionDelegate,
    reconcile_report: Option<ReconcileReport>,
}

impl ContentSession {
    /// Open the local store, start the download coordinator and spawn the
    /// sync engine.
    ///
    /// When `reconcile_on_start` is set, records a previous process left
    /// mid-flight are resolved before the engine is spawned.
    ///
    /// # Errors
    ///
    /// Invalid configuration, an unopenable database or a failed
    /// reconciliation.
    #[instrument(skip(config))]
    pub async fn start(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let db_config = match &config.database {
            DatabaseLocation::File(path) => {
                let path_display = path.to_string_lossy();
                info!(path = %strip_path(&path_display), "Opening content database");
                DatabaseConfig::new(path.clone())
            }
            DatabaseLocation::InMemory => DatabaseConfig::in_memory(),
        };
        let pool = create_pool(db_config).await?;
        let store = Arc::new(SqliteLocalStore::new(pool.clone()));

        let event_bus = EventBus::new(config.event_buffer_size);

        let mut coordinator = DownloadCoordinator::new(config.download_engine.clone(), store.clone())
            .with_event_bus(event_bus.clone())
            .with_backoff(config.reconnect_backoff)
            .with_progress_capacity(config.progress_buffer_size);
        if let Some(queue) = &config.job_queue {
            coordinator = coordinator.with_job_queue(queue.clone());
        }
        let coordinator = Arc::new(coordinator);

        // Subscribed before the pump starts so no update is missed.
        let progress = coordinator.subscribe_progress();
        coordinator.start();

        let reconcile_report = if config.reconcile_on_start {
            match coordinator.reconcile().await {
                Ok(report) => Some(report),
                Err(e) => {
                    warn!(error = %e, "Startup reconciliation failed");
                    coordinator.shutdown().await;
                    pool.close().await;
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let notifier = BoundaryNotifier::default();

        let mut builder = ContentSyncEngine::builder(config.content_source.clone(), store.clone())
            .progress(progress)
            .boundary(&notifier)
            .page_size(config.page_size)
            .event_bus(event_bus.clone());
        if let Some(timeout) = config.fetch_timeout {
            builder = builder.fetch_timeout(timeout);
        }
        let engine = builder.spawn();

        let bookmarks = BookmarkActionDelegate::new(store.clone(), notifier.clone())
            .with_event_bus(event_bus.clone());
        let downloads = DownloadActionDelegate::new(
            store.clone(),
            coordinator.clone(),
            config.download_permission.clone(),
            notifier,
        )
        .with_event_bus(event_bus.clone());

        info!(page_size = config.page_size, "Content session started");

        Ok(Self {
            pool,
            store,
            event_bus,
            coordinator,
            engine,
            bookmarks,
            downloads,
            reconcile_report,
        })
    }

    // ------------------------------------------------------------------
    // Listing
    // ------------------------------------------------------------------

    pub fn listing(&self) -> watch::Receiver<MergedListing> {
        self.engine.listing()
    }

    pub fn snapshot(&self) -> MergedListing {
        self.engine.snapshot()
    }

    pub async fn load_first_page(&self) -> Result<LoadStatus> {
        Ok(self.engine.load_first_page().await?)
    }

    pub async fn load_next_page(&self) -> Result<LoadStatus> {
        Ok(self.engine.load_next_page().await?)
    }

    pub async fn refresh(&self) -> Result<LoadStatus> {
        Ok(self.engine.refresh().await?)
    }

    pub async fn retry(&self) -> Result<LoadStatus> {
        Ok(self.engine.retry().await?)
    }

    /// Abandon the in-flight load, if any.
    pub async fn cancel_load(&self) -> Result<bool> {
        Ok(self.engine.cancel_load().await?)
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    pub async fn toggle_bookmark(&self, id: &ContentId) -> Result<ActionReport> {
        self.bookmarks.toggle_bookmark(id).await
    }

    pub async fn set_bookmark(&self, id: &ContentId, bookmarked: bool) -> Result<ActionReport> {
        self.bookmarks.set_bookmark(id, bookmarked).await
    }

    pub async fn start_download(&self, id: &ContentId) -> Result<ActionReport> {
        self.downloads.start_download(id).await
    }

    pub async fn delete_download(&self, id: &ContentId) -> Result<ActionReport> {
        self.downloads.delete_download(id).await
    }

    // ------------------------------------------------------------------
    // Local queries
    // ------------------------------------------------------------------

    /// Records with any download state other than `NotDownloaded`.
    pub async fn downloads(&self, request: PageRequest) -> Result<Page<LocalRecord>> {
        Ok(self.store.list(&RecordFilter::downloads(), request).await?)
    }

    pub async fn bookmarks(&self, request: PageRequest) -> Result<Page<LocalRecord>> {
        Ok(self.store.list(&RecordFilter::bookmarked(), request).await?)
    }

    pub fn events(&self) -> EventStream {
        self.event_bus.stream()
    }

    /// Outcome of the startup reconciliation, if one ran.
    pub fn reconcile_report(&self) -> Option<ReconcileReport> {
        self.reconcile_report
    }

    /// Resolve mid-flight records again, e.g. after the engine reconnected.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        Ok(self.coordinator.reconcile().await?)
    }

    pub fn engine(&self) -> &ContentSyncEngine {
        &self.engine
    }

    /// Stop the engine and coordinator and close the database.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
        self.coordinator.shutdown().await;
        self.pool.close().await;
        info!("Content session closed");
    }
}
