//! Paginated content listing with local bookmark and download state.
//!
//! Hosts build a [`ContentSession`] from a [`CoreConfig`] and provide the
//! bridge implementations from [`bridge_traits`]. The component crates are
//! re-exported for hosts that wire the pieces themselves.

pub use core_service::{
    ActionKind, ActionOutcome, ActionPhase, ActionReport, ContentSession, CoreError,
    DenialReason, Result,
};
pub use core_runtime::config::{BackoffPolicy, CoreConfig, CoreConfigBuilder};

pub use bridge_traits;
pub use core_download;
pub use core_library;
pub use core_runtime;
pub use core_sync;
