use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;

use crate::Result;

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Topic the message was published under.
    pub topic: String,

    /// Serialized event.
    pub body: Bytes,
}

/// A stream of inbound messages. Dropping it ends the subscription.
pub type MessageStream = Pin<Box<dyn Stream<Item = BrokerMessage> + Send>>;

/// Topic-routed publish/subscribe.
///
/// Messages are routed by exact topic match within a named exchange. Each
/// subscription gets its own private queue: two subscribers bound to the
/// same topic both receive every message.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Ensures the exchange exists. Declaring an existing exchange is a no-op.
    async fn declare_exchange(&self, exchange: &str) -> Result<()>;

    /// Publishes a message under `topic`.
    async fn publish(&self, exchange: &str, topic: &str, body: Bytes) -> Result<()>;

    /// Opens an exclusive subscription bound to every topic in `topics`.
    async fn subscribe(&self, exchange: &str, topics: &[&str]) -> Result<MessageStream>;
}
