//! # Core Configuration Module
//!
//! Configuration for a content session.
//!
//! ## Overview
//!
//! A [`CoreConfig`] bundles the bridges a session consumes (remote catalog,
//! download engine, permission check, optional job queue) with the tunables
//! of the sync engine and download coordinator. It is built through
//! [`CoreConfigBuilder`], which validates fail-fast: a missing bridge is a
//! [`Error::CapabilityMissing`], an out-of-range setting an [`Error::Config`].
//!
//! ## Required Dependencies
//!
//! - `ContentSource` - remote catalog pages
//! - `DownloadEngine` - transfers and progress
//! - `DownloadPermission` - entitlement check before downloads
//!
//! ## Optional Dependencies
//!
//! - `JobQueue` - persistent hand-off; without it jobs go straight to the engine
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/data/content.db")
//!     .page_size(25)
//!     .content_source(Arc::new(MyCatalogClient::new()))
//!     .download_engine(Arc::new(MyDownloadService::new()))
//!     .download_permission(Arc::new(MyEntitlements::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{ContentSource, DownloadEngine, DownloadPermission, JobQueue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of items requested per page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest page size a session will request.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Where the local store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    /// Non-persistent store, discarded with the session
    InMemory,
}

/// Exponential backoff bounds used when resubscribing to the download engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    /// Delay following `current`, doubling up to `max`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
        }
    }
}

/// Configuration for one content session.
#[derive(Clone)]
pub struct CoreConfig {
    pub database: DatabaseLocation,

    /// Items requested per remote page
    pub page_size: u32,

    /// Upper bound on a single page fetch, on top of the client's own timeout
    pub fetch_timeout: Option<Duration>,

    /// Buffer of the [`EventBus`](crate::events::EventBus)
    pub event_buffer_size: usize,

    /// Buffer of the download progress fan-out channel
    pub progress_buffer_size: usize,

    pub reconnect_backoff: BackoffPolicy,

    /// Run download reconciliation when the session starts
    pub reconcile_on_start: bool,

    pub content_source: Arc<dyn ContentSource>,
    pub download_engine: Arc<dyn DownloadEngine>,
    pub download_permission: Arc<dyn DownloadPermission>,
    pub job_queue: Option<Arc<dyn JobQueue>>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database", &self.database)
            .field("page_size", &self.page_size)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("progress_buffer_size", &self.progress_buffer_size)
            .field("reconnect_backoff", &self.reconnect_backoff)
            .field("reconcile_on_start", &self.reconcile_on_start)
            .field("content_source", &"ContentSource { ... }")
            .field("download_engine", &"DownloadEngine { ... }")
            .field("download_permission", &"DownloadPermission { ... }")
            .field("job_queue", &self.job_queue.as_ref().map(|_| "JobQueue { ... }"))
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Page size is within `1..=MAX_PAGE_SIZE`
    /// - Channel buffers are non-zero
    /// - Backoff bounds are ordered and non-zero
    /// - Fetch timeout, when set, is non-zero
    pub fn validate(&self) -> Result<()> {
        if let DatabaseLocation::File(path) = &self.database {
            if path.as_os_str().is_empty() {
                return Err(Error::Config("Database path cannot be empty".to_string()));
            }
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if self.event_buffer_size == 0 || self.progress_buffer_size == 0 {
            return Err(Error::Config(
                "Event and progress buffers must hold at least one message".to_string(),
            ));
        }

        if self.reconnect_backoff.initial.is_zero()
            || self.reconnect_backoff.initial > self.reconnect_backoff.max
        {
            return Err(Error::Config(
                "Reconnect backoff must start above zero and not exceed its maximum".to_string(),
            ));
        }

        if matches!(self.fetch_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config("Fetch timeout cannot be zero".to_string()));
        }

        Ok(())
    }
}

fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    database: Option<DatabaseLocation>,
    page_size: Option<u32>,
    fetch_timeout: Option<Duration>,
    event_buffer_size: Option<usize>,
    progress_buffer_size: Option<usize>,
    reconnect_backoff: Option<BackoffPolicy>,
    reconcile_on_start: Option<bool>,
    content_source: Option<Arc<dyn ContentSource>>,
    download_engine: Option<Arc<dyn DownloadEngine>>,
    download_permission: Option<Arc<dyn DownloadPermission>>,
    job_queue: Option<Arc<dyn JobQueue>>,
}

impl CoreConfigBuilder {
    /// Persist the local store in a SQLite file at `path`.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database = Some(DatabaseLocation::File(path.into()));
        self
    }

    /// Keep the local store in memory for the lifetime of the session.
    pub fn in_memory_database(mut self) -> Self {
        self.database = Some(DatabaseLocation::InMemory);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn progress_buffer_size(mut self, size: usize) -> Self {
        self.progress_buffer_size = Some(size);
        self
    }

    pub fn reconnect_backoff(mut self, policy: BackoffPolicy) -> Self {
        self.reconnect_backoff = Some(policy);
        self
    }

    pub fn reconcile_on_start(mut self, enabled: bool) -> Self {
        self.reconcile_on_start = Some(enabled);
        self
    }

    pub fn content_source(mut self, source: Arc<dyn ContentSource>) -> Self {
        self.content_source = Some(source);
        self
    }

    pub fn download_engine(mut self, engine: Arc<dyn DownloadEngine>) -> Self {
        self.download_engine = Some(engine);
        self
    }

    pub fn download_permission(mut self, permission: Arc<dyn DownloadPermission>) -> Self {
        self.download_permission = Some(permission);
        self
    }

    pub fn job_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.job_queue = Some(queue);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when no database location was chosen or a setting is out of range
    /// - [`Error::CapabilityMissing`] when a required bridge was not provided
    pub fn build(self) -> Result<CoreConfig> {
        let database = self.database.ok_or_else(|| {
            Error::Config(
                "Database location is required. Use .database_path() or .in_memory_database()."
                    .to_string(),
            )
        })?;

        let content_source = self.content_source.ok_or_else(|| {
            capability_missing(
                "ContentSource",
                "A remote catalog client is required to load pages.",
            )
        })?;

        let download_engine = self.download_engine.ok_or_else(|| {
            capability_missing(
                "DownloadEngine",
                "A download engine is required for download progress and removal.",
            )
        })?;

        let download_permission = self.download_permission.ok_or_else(|| {
            capability_missing(
                "DownloadPermission",
                "A permission check is required before downloads can start.",
            )
        })?;

        let config = CoreConfig {
            database,
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            fetch_timeout: self.fetch_timeout,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            progress_buffer_size: self.progress_buffer_size.unwrap_or(256),
            reconnect_backoff: self.reconnect_backoff.unwrap_or_default(),
            reconcile_on_start: self.reconcile_on_start.unwrap_or(true),
            content_source,
            download_engine,
            download_permission,
            job_queue: self.job_queue,
        };

        config.validate()?;

        Ok(config)
    }
}
