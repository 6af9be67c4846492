//! Download entitlement check.

use serde::{Deserialize, Serialize};

/// Why the host refused a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDenial {
    NoActiveSubscription,
    StoragePermissionMissing,
}

impl PermissionDenial {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoActiveSubscription => "no active subscription",
            Self::StoragePermissionMissing => "storage permission missing",
        }
    }
}

/// Synchronous predicate consulted before any download mutation.
///
/// Implementations answer from cached state (entitlements fetched at sign-in,
/// OS permission flags); the call must not block on I/O.
pub trait DownloadPermission: Send + Sync {
    fn can_download(&self) -> bool;

    /// Reason reported to the caller when [`can_download`](Self::can_download) is false
    fn denial_reason(&self) -> PermissionDenial {
        PermissionDenial::NoActiveSubscription
    }
}
