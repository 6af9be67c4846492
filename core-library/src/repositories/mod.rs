//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface so callers can substitute test doubles
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//! - Listing queries page through `Page<T>`

pub mod local_record;
pub mod pagination;

pub use local_record::{LocalStore, RecordFilter, SqliteLocalStore, TransitionOutcome};
pub use pagination::{Page, PageRequest};
