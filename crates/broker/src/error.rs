use thiserror::Error;

/// Errors raised by broker adapters.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach the broker.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A message could not be published.
    #[error("Publish error: {0}")]
    Publish(String),

    /// A subscription could not be created.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// An event could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
