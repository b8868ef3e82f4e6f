//! Domain error types.

use thiserror::Error;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate with the same identity already exists.
    #[error("{0}")]
    Conflict(String),

    /// The referenced aggregate does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The input does not have the expected shape or values.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A command request named a type nobody understands.
    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    /// A broker message arrived on a topic with no registered event type.
    #[error("Unknown event topic: {0}")]
    UnknownTopic(String),

    /// Two event types claimed the same topic.
    #[error("Duplicate event topic: {0}")]
    DuplicateTopic(&'static str),

    /// A message body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl DomainError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        DomainError::Conflict(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DomainError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::Validation(msg.into())
    }
}
