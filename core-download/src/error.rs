use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Download engine error: {0}")]
    Engine(#[from] BridgeError),

    #[error("Local store error: {0}")]
    Store(#[from] LibraryError),
}

pub type Result<T> = std::result::Result<T, DownloadError>;
