//! Dispatch error types.

use domain::DomainError;
use thiserror::Error;
use unit_of_work::StorageError;

/// Errors a command or event handler can return.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A known domain failure: conflict, missing aggregate, bad input.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The storage session failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Internal(error.into())
    }

    /// Returns true for known application errors, false for unexpected failures.
    pub fn is_application(&self) -> bool {
        matches!(self, HandlerError::Domain(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::Domain(e) => ErrorKind::from(e),
            HandlerError::Storage(e) => ErrorKind::from(e),
            HandlerError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Errors returned to the caller of `MessageBus::handle`.
#[derive(Debug, Error)]
pub enum BusError {
    /// No handler is registered for the command type.
    #[error("Unknown command: {0}")]
    UnknownCommand(&'static str),

    /// Two handlers were registered for the same command type.
    #[error("Duplicate handler for command: {0}")]
    DuplicateCommandHandler(&'static str),

    /// The command handler failed.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Opening or closing the unit of work failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BusError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BusError::Handler(e) => e.kind(),
            BusError::Storage(e) => ErrorKind::from(e),
            BusError::UnknownCommand(_) | BusError::DuplicateCommandHandler(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Coarse error classification for transport adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Validation,
    Internal,
}

impl From<&DomainError> for ErrorKind {
    fn from(error: &DomainError) -> Self {
        match error {
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::Validation(_)
            | DomainError::UnknownCommand(_)
            | DomainError::UnknownTopic(_)
            | DomainError::Decode(_) => ErrorKind::Validation,
            DomainError::DuplicateTopic(_) => ErrorKind::Internal,
        }
    }
}

impl From<&StorageError> for ErrorKind {
    fn from(error: &StorageError) -> Self {
        match error {
            StorageError::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Internal,
        }
    }
}
