//! The published view.

use crate::network_state::NetworkState;
use bridge_traits::catalog::RemoteFetchError;
use core_library::{ContentId, ContentItem};

/// Ordered items plus load status, as observed by the presentation layer.
///
/// Items keep the remote order; local fields are overlaid at merge time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedListing {
    pub items: Vec<ContentItem>,
    pub network_state: NetworkState,
    /// Another page can be requested
    pub has_more: bool,
    /// Error of the most recent failed load, cleared by the next success
    pub last_error: Option<RemoteFetchError>,
}

impl MergedListing {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ContentId) -> Option<&ContentItem> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn ids(&self) -> Vec<ContentId> {
        self.items.iter().map(|item| item.id().clone()).collect()
    }
}
