//! # Content Sync
//!
//! Keeps one ordered, de-duplicated listing of remote content with local
//! state overlaid, and the load status that goes with it.
//!
//! ## Overview
//!
//! Three sources feed the listing:
//! - Remote pages from the [`ContentSource`](bridge_traits::catalog::ContentSource)
//! - Local changes signalled through the [`BoundaryNotifier`]
//! - Download progress from the [`DownloadCoordinator`](core_download::DownloadCoordinator)
//!
//! ## Components
//!
//! - **Network State** (`network_state`): finite load status of the listing
//! - **Listing** (`listing`): the published [`MergedListing`] value
//! - **Boundary** (`boundary`): local-change notification channel
//! - **Engine** (`engine`): the single-writer task that merges and publishes

pub mod boundary;
pub mod engine;
pub mod error;
pub mod listing;
pub mod network_state;

pub use boundary::{BoundaryChange, BoundaryNotifier, DEFAULT_BOUNDARY_BUFFER_SIZE};
pub use engine::{ContentSyncEngine, ContentSyncEngineBuilder, LoadRejection, LoadStatus};
pub use error::{Result, SyncError};
pub use listing::MergedListing;
pub use network_state::NetworkState;
