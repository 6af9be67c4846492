use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Corrupt local record for {content_id}: {message}")]
    CorruptRecord { content_id: String, message: String },
}

pub type Result<T> = std::result::Result<T, LibraryError>;
