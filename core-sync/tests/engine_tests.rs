//! Integration tests for the content sync engine
//!
//! These tests drive the engine with a scripted content source, a real
//! in-memory SQLite store and a download coordinator fed by the in-process
//! engine fake:
//! - First page outcomes (empty, merged, failed)
//! - Next page preconditions and failure handling
//! - Cancellation and timeouts
//! - Local change and download progress merges

use bridge_traits::catalog::{Cursor, RemoteFetchError};
use bridge_traits::download::TransferState;
use bridge_traits::testing::{remote_items, ChannelDownloadEngine, ScriptedContentSource};
use core_download::DownloadCoordinator;
use core_library::db::create_test_pool;
use core_library::{ContentId, DownloadState, LocalStore, SqliteLocalStore};
use core_runtime::config::BackoffPolicy;
use core_runtime::events::{CoreEvent, EventBus, ListingEvent};
use core_sync::{
    BoundaryChange, BoundaryNotifier, ContentSyncEngine, LoadRejection, LoadStatus, MergedListing,
    NetworkState,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    source: Arc<ScriptedContentSource>,
    store: Arc<SqliteLocalStore>,
    downloads: Arc<ChannelDownloadEngine>,
    notifier: BoundaryNotifier,
    bus: EventBus,
    // Held for its progress pump.
    _coordinator: DownloadCoordinator,
    engine: ContentSyncEngine,
}

async fn harness() -> Harness {
    harness_with(|builder| builder).await
}

async fn harness_with(
    configure: impl FnOnce(core_sync::ContentSyncEngineBuilder) -> core_sync::ContentSyncEngineBuilder,
) -> Harness {
    let source = Arc::new(ScriptedContentSource::new());
    let store = Arc::new(SqliteLocalStore::new(create_test_pool().await.unwrap()));
    let downloads = Arc::new(ChannelDownloadEngine::new());
    let notifier = BoundaryNotifier::default();
    let bus = EventBus::new(64);

    let coordinator = DownloadCoordinator::new(downloads.clone(), store.clone())
        .with_backoff(BackoffPolicy::new(
            Duration::from_millis(1),
            Duration::from_millis(10),
        ));
    let progress = coordinator.subscribe_progress();
    coordinator.start();
    downloads.wait_for_subscribers(1).await;

    let builder = ContentSyncEngine::builder(source.clone(), store.clone())
        .progress(progress)
        .boundary(&notifier)
        .event_bus(bus.clone())
        .page_size(3);
    let engine = configure(builder).spawn();

    Harness {
        source,
        store,
        downloads,
        notifier,
        bus,
        _coordinator: coordinator,
        engine,
    }
}

async fn settled(engine: &ContentSyncEngine) -> MergedListing {
    tokio::time::timeout(Duration::from_secs(2), engine.settled())
        .await
        .expect("timed out waiting for the listing to settle")
        .unwrap()
}

async fn wait_for_state(engine: &ContentSyncEngine, id: &str, state: DownloadState) -> MergedListing {
    let id = ContentId::new(id);
    tokio::time::timeout(
        Duration::from_secs(2),
        engine.wait_until(|listing| {
            listing
                .get(&id)
                .is_some_and(|item| item.download_state == state)
        }),
    )
    .await
    .expect("timed out waiting for download state")
    .unwrap()
}

fn ids(listing: &MergedListing) -> Vec<String> {
    listing
        .items
        .iter()
        .map(|item| item.id().as_str().to_string())
        .collect()
}

fn id(value: &str) -> ContentId {
    ContentId::new(value)
}

// ============================================================================
// First page
// ============================================================================

#[tokio::test]
async fn test_empty_first_page_is_init_empty() {
    let h = harness().await;
    h.source.push_page(Vec::new(), None);

    assert_eq!(h.engine.load_first_page().await.unwrap(), LoadStatus::Started);
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::InitEmpty);
    assert!(listing.is_empty());
    assert!(!listing.has_more);
    assert!(listing.network_state.shows_empty_state());
}

#[tokio::test]
async fn test_first_page_overlays_persisted_download() {
    let h = harness().await;
    h.store
        .upsert_download_state(&id("42"), DownloadState::Completed)
        .await
        .unwrap();
    h.source.push_page(remote_items(41, 3), Some("page-2"));

    h.engine.load_first_page().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::InitSuccess);
    assert_eq!(ids(&listing), vec!["41", "42", "43"]);
    assert_eq!(listing.get(&id("42")).unwrap().download_state, DownloadState::Completed);
    assert_eq!(listing.get(&id("41")).unwrap().download_state, DownloadState::NotDownloaded);
    assert_eq!(listing.get(&id("43")).unwrap().download_state, DownloadState::NotDownloaded);
    assert!(listing.has_more);
}

#[tokio::test]
async fn test_load_while_in_flight_is_ignored() {
    let h = harness().await;
    let release = h.source.push_held_page(remote_items(1, 2), None);

    assert_eq!(h.engine.load_first_page().await.unwrap(), LoadStatus::Started);
    assert_eq!(
        h.engine.load_first_page().await.unwrap(),
        LoadStatus::AlreadyInFlight
    );
    assert_eq!(h.engine.snapshot().network_state, NetworkState::Loading);

    release.notify_one();
    let listing = settled(&h.engine).await;
    assert_eq!(listing.len(), 2);
    assert_eq!(h.source.request_count(), 1);
}

#[tokio::test]
async fn test_first_page_failure_is_init_failed() {
    let h = harness().await;
    let mut events = h.bus.subscribe();
    h.source
        .push_error(RemoteFetchError::Network("connection reset".to_string()));

    h.engine.load_first_page().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::InitFailed);
    assert!(listing.network_state.shows_retry());
    assert_eq!(
        listing.last_error,
        Some(RemoteFetchError::Network("connection reset".to_string()))
    );

    let mut failed = None;
    while let Ok(event) = events.try_recv() {
        if let CoreEvent::Listing(ListingEvent::LoadFailed { initial, retriable, .. }) = event {
            failed = Some((initial, retriable));
        }
    }
    assert_eq!(failed, Some((true, true)));
}

#[tokio::test]
async fn test_refresh_failure_keeps_items() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.source.push_error(RemoteFetchError::Server {
        status: 503,
        message: "unavailable".to_string(),
    });
    h.engine.refresh().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::InitFailed);
    assert_eq!(ids(&listing), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_next_page_after_failed_refresh_is_rejected() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.source.push_error(RemoteFetchError::Server {
        status: 503,
        message: "unavailable".to_string(),
    });
    h.engine.refresh().await.unwrap();
    settled(&h.engine).await;

    assert_eq!(
        h.engine.load_next_page().await.unwrap(),
        LoadStatus::Rejected(LoadRejection::NoSuccessfulPage)
    );
    let listing = h.engine.snapshot();
    assert_eq!(listing.network_state, NetworkState::InitFailed);
    assert_eq!(ids(&listing), vec!["1", "2", "3"]);
    assert_eq!(h.source.request_count(), 2);

    // Retry goes back to the first page, not the stale cursor.
    h.source.push_page(remote_items(20, 2), None);
    assert_eq!(h.engine.retry().await.unwrap(), LoadStatus::Started);
    let listing = settled(&h.engine).await;
    assert_eq!(listing.network_state, NetworkState::InitSuccess);
    assert_eq!(ids(&listing), vec!["20", "21"]);
    assert!(h.source.requests()[2].is_first_page());
}

#[tokio::test]
async fn test_refresh_replaces_previous_pages() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source.push_page(remote_items(4, 3), None);
    h.source.push_page(remote_items(10, 2), None);

    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;
    h.engine.load_next_page().await.unwrap();
    assert_eq!(settled(&h.engine).await.len(), 6);

    h.engine.refresh().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(ids(&listing), vec!["10", "11"]);
    assert_eq!(listing.network_state, NetworkState::InitSuccess);
    assert!(h.source.requests()[2].is_first_page());
}

// ============================================================================
// Next page
// ============================================================================

#[tokio::test]
async fn test_next_page_without_prior_success_is_rejected() {
    let h = harness().await;

    assert_eq!(
        h.engine.load_next_page().await.unwrap(),
        LoadStatus::Rejected(LoadRejection::NoSuccessfulPage)
    );
    assert_eq!(h.engine.snapshot().network_state, NetworkState::Idle);

    h.source.push_error(RemoteFetchError::Auth("expired".to_string()));
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    assert_eq!(
        h.engine.load_next_page().await.unwrap(),
        LoadStatus::Rejected(LoadRejection::NoSuccessfulPage)
    );
    assert_eq!(h.engine.snapshot().network_state, NetworkState::InitFailed);
    assert_eq!(h.source.request_count(), 1);
}

#[tokio::test]
async fn test_next_page_after_last_page_is_rejected() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 2), None);
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    assert_eq!(
        h.engine.load_next_page().await.unwrap(),
        LoadStatus::Rejected(LoadRejection::NoMorePages)
    );
}

#[tokio::test]
async fn test_next_page_failure_keeps_items_and_retry_resumes() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source
        .push_error(RemoteFetchError::Timeout(Duration::from_secs(30)));
    h.source.push_page(remote_items(4, 3), None);

    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.engine.load_next_page().await.unwrap();
    let failed = settled(&h.engine).await;
    assert_eq!(failed.network_state, NetworkState::Failed);
    assert_eq!(ids(&failed), vec!["1", "2", "3"]);
    assert!(failed.has_more);

    assert_eq!(h.engine.retry().await.unwrap(), LoadStatus::Started);
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::Success);
    assert_eq!(ids(&listing), vec!["1", "2", "3", "4", "5", "6"]);
    assert!(listing.last_error.is_none());

    let requests = h.source.requests();
    assert_eq!(requests[1].cursor, Some(Cursor::new("page-2")));
    assert_eq!(requests[2].cursor, Some(Cursor::new("page-2")));
    assert_eq!(requests[2].page_size, 3);
}

#[tokio::test]
async fn test_retry_without_failure_is_rejected() {
    let h = harness().await;
    assert_eq!(
        h.engine.retry().await.unwrap(),
        LoadStatus::Rejected(LoadRejection::NothingToRetry)
    );
}

#[tokio::test]
async fn test_duplicate_remote_ids_are_dropped() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source.push_page(remote_items(3, 3), None);

    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;
    h.engine.load_next_page().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(ids(&listing), vec!["1", "2", "3", "4", "5"]);
}

// ============================================================================
// Cancellation and timeouts
// ============================================================================

#[tokio::test]
async fn test_cancelled_load_never_publishes() {
    let h = harness().await;
    let release = h.source.push_held_page(remote_items(1, 3), None);

    h.engine.load_first_page().await.unwrap();
    assert!(h.engine.cancel_load().await.unwrap());

    let listing = h.engine.snapshot();
    assert_eq!(listing.network_state, NetworkState::Idle);

    release.notify_one();
    tokio::time::sleep(Duration::from_millis(20)).await;
    h.engine.flush().await.unwrap();

    let listing = h.engine.snapshot();
    assert!(listing.is_empty());
    assert_eq!(listing.network_state, NetworkState::Idle);
    assert!(!h.engine.cancel_load().await.unwrap());
}

#[tokio::test]
async fn test_cancel_restores_last_settled_state() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    let _release = h.source.push_held_page(remote_items(4, 3), None);
    h.engine.load_next_page().await.unwrap();
    assert_eq!(h.engine.snapshot().network_state, NetworkState::Loading);

    h.engine.cancel_load().await.unwrap();
    let listing = h.engine.snapshot();
    assert_eq!(listing.network_state, NetworkState::InitSuccess);
    assert_eq!(listing.len(), 3);
}

#[tokio::test]
async fn test_fetch_timeout_surfaces_as_failure() {
    let h = harness_with(|builder| builder.fetch_timeout(Duration::from_millis(20))).await;
    let _release = h.source.push_held_page(remote_items(1, 3), None);

    h.engine.load_first_page().await.unwrap();
    let listing = settled(&h.engine).await;

    assert_eq!(listing.network_state, NetworkState::InitFailed);
    assert_eq!(
        listing.last_error,
        Some(RemoteFetchError::Timeout(Duration::from_millis(20)))
    );
}

// ============================================================================
// Local changes
// ============================================================================

#[tokio::test]
async fn test_local_change_never_alters_network_state() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source
        .push_error(RemoteFetchError::Network("offline".to_string()));

    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;
    h.engine.load_next_page().await.unwrap();
    settled(&h.engine).await;

    h.store.upsert_bookmark(&id("2"), true).await.unwrap();
    h.engine
        .on_local_change(BoundaryChange::single(id("2")))
        .await
        .unwrap();

    let listing = h.engine.snapshot();
    assert!(listing.get(&id("2")).unwrap().bookmarked);
    assert_eq!(listing.network_state, NetworkState::Failed);
    assert_eq!(h.source.request_count(), 2);
}

#[tokio::test]
async fn test_local_change_outside_view_publishes_nothing() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), None);
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    let mut listing = h.engine.listing();
    listing.borrow_and_update();

    h.store.upsert_bookmark(&id("99"), true).await.unwrap();
    h.engine
        .on_local_change(BoundaryChange::single(id("99")))
        .await
        .unwrap();

    assert!(!listing.has_changed().unwrap());
}

#[tokio::test]
async fn test_bookmark_toggled_twice_round_trips() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), None);
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.store.toggle_bookmark(&id("1")).await.unwrap();
    h.notifier.notify(&id("1"));
    h.engine.flush().await.unwrap();
    assert!(h.engine.snapshot().get(&id("1")).unwrap().bookmarked);

    h.store.toggle_bookmark(&id("1")).await.unwrap();
    h.notifier.notify(&id("1"));
    h.engine.flush().await.unwrap();

    assert!(!h.engine.snapshot().get(&id("1")).unwrap().bookmarked);
    assert!(!h.store.get(&id("1")).await.unwrap().unwrap().bookmarked);
}

// ============================================================================
// Download progress
// ============================================================================

#[tokio::test]
async fn test_progress_interleaved_with_pages_keeps_remote_order() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source.push_page(remote_items(4, 3), None);

    h.engine.load_first_page().await.unwrap();
    h.downloads.emit("2", TransferState::Queued);
    settled(&h.engine).await;

    h.engine.load_next_page().await.unwrap();
    h.downloads.emit(
        "2",
        TransferState::Downloading {
            downloaded_bytes: 40,
            total_bytes: Some(100),
        },
    );
    h.downloads.emit("5", TransferState::Completed);
    settled(&h.engine).await;

    wait_for_state(&h.engine, "2", DownloadState::InProgress(40)).await;
    let listing = wait_for_state(&h.engine, "5", DownloadState::Completed).await;

    assert_eq!(ids(&listing), vec!["1", "2", "3", "4", "5", "6"]);
    assert_eq!(listing.network_state, NetworkState::Success);
}

#[tokio::test]
async fn test_progress_outside_view_is_picked_up_on_next_merge() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 3), Some("page-2"));
    h.source.push_page(remote_items(4, 3), None);

    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.downloads.emit("5", TransferState::Completed);
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(record) = h.store.get(&id("5")).await.unwrap() {
                if record.download_state == DownloadState::Completed {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("progress was not persisted");
    assert!(h.engine.snapshot().get(&id("5")).is_none());

    h.engine.load_next_page().await.unwrap();
    let listing = settled(&h.engine).await;
    assert_eq!(listing.get(&id("5")).unwrap().download_state, DownloadState::Completed);
}

#[tokio::test]
async fn test_pending_removal_resolves_to_not_downloaded() {
    let h = harness().await;
    h.store
        .upsert_download_state(&id("42"), DownloadState::Completed)
        .await
        .unwrap();
    h.source.push_page(remote_items(41, 3), None);
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.store
        .transition_download_state(&id("42"), DownloadState::PendingRemoval)
        .await
        .unwrap();
    h.notifier.notify(&id("42"));
    h.engine.flush().await.unwrap();
    assert_eq!(
        h.engine.snapshot().get(&id("42")).unwrap().download_state,
        DownloadState::PendingRemoval
    );

    // A late completion from before the delete must not win.
    h.downloads.emit("42", TransferState::Completed);
    h.downloads.emit("42", TransferState::Removed);

    let listing = wait_for_state(&h.engine, "42", DownloadState::NotDownloaded).await;
    assert_eq!(listing.network_state, NetworkState::InitSuccess);
}

#[tokio::test]
async fn test_host_reported_progress_is_recorded() {
    let h = harness().await;
    h.source.push_page(remote_items(1, 2), None);
    h.engine.load_first_page().await.unwrap();
    settled(&h.engine).await;

    h.engine
        .on_download_progress(id("1"), DownloadState::Queued)
        .await
        .unwrap();
    h.engine
        .on_download_progress(id("77"), DownloadState::Queued)
        .await
        .unwrap();

    assert_eq!(
        h.engine.snapshot().get(&id("1")).unwrap().download_state,
        DownloadState::Queued
    );
    assert_eq!(
        h.store.get(&id("77")).await.unwrap().unwrap().download_state,
        DownloadState::Queued
    );
}
