use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The engine task has exited; no further commands are accepted.
    #[error("Sync engine is not running")]
    EngineStopped,

    /// A host-reported download state could not be written.
    #[error("Local store error: {0}")]
    Store(#[from] core_library::LibraryError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
