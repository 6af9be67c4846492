//! # Download Lifecycle
//!
//! Sits between the host download engine and the rest of the core.
//!
//! ## Components
//!
//! - **Coordinator** (`coordinator`): job hand-off, the persisted progress
//!   pump, engine reconnection and startup reconciliation
//! - **Mapping** (`mapping`): engine transfer states onto [`DownloadState`](core_library::DownloadState)
//! - **Progress** (`progress`): the multi-consumer update stream

pub mod coordinator;
pub mod error;
pub mod mapping;
pub mod progress;

pub use coordinator::{DownloadCoordinator, ReconcileReport};
pub use error::{DownloadError, Result};
pub use mapping::map_transfer_state;
pub use progress::{DownloadProgress, ProgressStream, DEFAULT_PROGRESS_BUFFER_SIZE};
