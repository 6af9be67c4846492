//! Background Job Hand-off
//!
//! Download and removal jobs are handed to a host queue that survives the
//! requesting process being killed (WorkManager, launchd, a persisted worker
//! table). The core passes an id and a job kind, nothing more; the queue owns
//! scheduling, retry and backoff.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{catalog::ContentId, error::Result};

/// Kind of background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Download,
    Removal,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Removal => "removal",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduled job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier for queues that do not mint their own.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub content_id: ContentId,
    pub kind: JobKind,
}

impl JobRequest {
    pub fn download(content_id: impl Into<ContentId>) -> Self {
        Self {
            content_id: content_id.into(),
            kind: JobKind::Download,
        }
    }

    pub fn removal(content_id: impl Into<ContentId>) -> Self {
        Self {
            content_id: content_id.into(),
            kind: JobKind::Removal,
        }
    }
}

/// Persistent background job queue.
///
/// `schedule` returns as soon as the job is durably recorded; it must not
/// wait for the job to run.
#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn schedule(&self, request: JobRequest) -> Result<JobId>;
}
