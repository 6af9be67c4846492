//! # Local Content Library
//!
//! Owns the locally persisted half of every catalog item and the data model
//! shared by the sync engine, the download coordinator and the action
//! delegates.
//!
//! ## Overview
//!
//! This crate manages:
//! - The merged data model ([`ContentItem`](models::ContentItem),
//!   [`DownloadState`](models::DownloadState), [`LocalRecord`](models::LocalRecord))
//! - SQLite connection pooling and embedded migrations ([`db`])
//! - The [`LocalStore`](repositories::LocalStore) repository: bookmark flags and
//!   download status keyed by content id, surviving process restarts

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use models::{ContentId, ContentItem, DownloadState, LocalRecord};
pub use repositories::{LocalStore, Page, PageRequest, RecordFilter, SqliteLocalStore, TransitionOutcome};
