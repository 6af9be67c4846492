//! # Host Bridge Traits
//!
//! Contracts for the collaborators the content core consumes but does not own.
//!
//! ## Overview
//!
//! The sync engine merges three independently updating sources: a paginated
//! remote catalog, a local store, and a download engine emitting progress.
//! Everything that talks to the outside world is expressed here as a trait so
//! that each host (desktop, mobile, tests) can ship its own adapter.
//!
//! ## Traits
//!
//! ### Remote catalog
//! - [`ContentSource`](catalog::ContentSource) - Cursor-based page fetches with a typed failure
//!
//! ### Downloads
//! - [`DownloadEngine`](download::DownloadEngine) - Start/remove transfers and stream engine-native progress
//! - [`JobQueue`](background::JobQueue) - Persistent hand-off for jobs that must survive process death
//! - [`DownloadPermission`](permission::DownloadPermission) - Synchronous entitlement check
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core refuses to start when a required bridge is absent:
//!
//! ```ignore
//! let source = builder.content_source
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "ContentSource".to_string(),
//!         message: "No remote catalog client provided".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! Remote fetches fail with [`RemoteFetchError`](catalog::RemoteFetchError) so the
//! engine can tell network, auth and server failures apart. Every other bridge
//! uses [`BridgeError`](error::BridgeError).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`; implementations are shared across
//! tasks behind `Arc`.

pub mod background;
pub mod catalog;
pub mod download;
pub mod error;
pub mod permission;
pub mod time;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::BridgeError;

pub use background::{JobId, JobKind, JobQueue, JobRequest};
pub use catalog::{ContentId, ContentSource, Cursor, FetchRequest, RemoteContent, RemoteFetchError, RemotePage};
pub use download::{DownloadEngine, TransferState, TransferUpdate, TransferUpdateStream};
pub use permission::{DownloadPermission, PermissionDenial};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, SystemClock};
