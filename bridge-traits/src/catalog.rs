//! Remote Catalog Abstractions
//!
//! Cursor-based paging over the remote content API. The wire format is the
//! adapter's business; the core only needs ids, display attributes and the
//! cursor for the next page.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identifier of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ContentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u64> for ContentId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

/// Opaque token pointing at the start of the next page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote-owned attributes of a catalog item.
///
/// The core never mutates these; they are carried verbatim into the merged
/// listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteContent {
    pub id: ContentId,
    pub title: String,
    /// Content kind as reported by the catalog (e.g. "episode", "collection")
    pub kind: String,
    pub duration_secs: Option<u32>,
}

impl RemoteContent {
    pub fn new(id: impl Into<ContentId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind: "episode".to_string(),
            duration_secs: None,
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

/// Parameters for a single page fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// `None` requests the first page
    pub cursor: Option<Cursor>,
    pub page_size: u32,
}

impl FetchRequest {
    pub fn first(page_size: u32) -> Self {
        Self {
            cursor: None,
            page_size,
        }
    }

    pub fn after(cursor: Cursor, page_size: u32) -> Self {
        Self {
            cursor: Some(cursor),
            page_size,
        }
    }

    pub fn is_first_page(&self) -> bool {
        self.cursor.is_none()
    }
}

/// One page as returned by the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemotePage {
    pub items: Vec<RemoteContent>,
    /// `None` when this is the last page
    pub next_cursor: Option<Cursor>,
}

impl RemotePage {
    pub fn new(items: Vec<RemoteContent>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

/// Typed failure of a page fetch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteFetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteFetchError {
    /// Whether retrying the same request without user intervention can succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Server { status, .. } => *status >= 500 || *status == 429,
            Self::Auth(_) => false,
        }
    }
}

/// Remote content API.
///
/// Implementations wrap whatever HTTP client and payload format the host
/// uses. Timeouts belong to the implementation and surface as
/// [`RemoteFetchError::Timeout`].
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::{ContentSource, FetchRequest};
///
/// async fn first_titles(source: &dyn ContentSource) -> Vec<String> {
///     match source.fetch_page(FetchRequest::first(20)).await {
///         Ok(page) => page.items.into_iter().map(|item| item.title).collect(),
///         Err(_) => Vec::new(),
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch the page starting at `request.cursor`
    async fn fetch_page(&self, request: FetchRequest) -> Result<RemotePage, RemoteFetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_conversions() {
        assert_eq!(ContentId::from(42u64).as_str(), "42");
        assert_eq!(ContentId::from("abc").to_string(), "abc");
        assert_eq!(ContentId::from("x".to_string()), ContentId::new("x"));
    }

    #[test]
    fn test_content_id_serializes_transparently() {
        let json = serde_json::to_string(&ContentId::new("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }

    #[test]
    fn test_fetch_request_first_page() {
        assert!(FetchRequest::first(20).is_first_page());
        assert!(!FetchRequest::after(Cursor::new("p2"), 20).is_first_page());
    }

    #[test]
    fn test_retriable_classification() {
        assert!(RemoteFetchError::Network("reset".into()).is_retriable());
        assert!(RemoteFetchError::Timeout(Duration::from_secs(5)).is_retriable());
        assert!(RemoteFetchError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retriable());
        assert!(!RemoteFetchError::Server {
            status: 404,
            message: "missing".into()
        }
        .is_retriable());
        assert!(!RemoteFetchError::Auth("expired".into()).is_retriable());
    }
}
