use common::AggregateId;
use thiserror::Error;

/// Errors raised by the storage session behind a unit of work.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An insert collided with an aggregate that already exists.
    #[error("Aggregate {0} already exists")]
    Conflict(AggregateId),

    /// A stored row could not be mapped back onto an aggregate.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The session was used after it finished.
    #[error("Invalid unit of work state: {0}")]
    InvalidState(&'static str),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
