//! # Content Service
//!
//! Host-facing façade over the content core.
//!
//! A [`ContentSession`] owns the local store, the download coordinator and
//! the sync engine for one content screen, and routes user actions through
//! the action delegates so every local write ends with a boundary signal.
//!
//! ```ignore
//! use core_service::ContentSession;
//!
//! let session = ContentSession::start(config).await?;
//! session.load_first_page().await?;
//!
//! let mut listing = session.listing();
//! while listing.changed().await.is_ok() {
//!     render(&listing.borrow());
//! }
//! ```

pub mod actions;
pub mod error;
pub mod session;

pub use actions::{
    ActionKind, ActionOutcome, ActionPhase, ActionReport, BookmarkActionDelegate, DenialReason,
    DownloadActionDelegate,
};
pub use error::{CoreError, Result};
pub use session::ContentSession;
