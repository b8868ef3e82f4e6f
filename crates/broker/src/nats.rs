//! NATS-backed broker.
//!
//! Exchanges map onto subject prefixes: a message published under topic `t`
//! on exchange `x` goes to subject `x.t`. Plain (non-queue-group)
//! subscriptions give every subscriber its own copy, which matches the
//! exclusive-queue-per-consumer model the rest of the crate expects.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;

use crate::{Broker, BrokerError, BrokerMessage, MessageStream, Result};

/// NATS client wrapper.
#[derive(Clone)]
pub struct NatsBroker {
    client: async_nats::Client,
}

impl NatsBroker {
    /// Connect to a NATS server.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!(url = url, "connecting to NATS server");
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrokerError::Connection(format!("failed to connect to {url}: {e}")))?;
        tracing::info!("NATS connection established");
        Ok(Self { client })
    }

    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }

    fn subject(exchange: &str, topic: &str) -> String {
        format!("{exchange}.{topic}")
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<()> {
        // Subjects need no declaration.
        tracing::debug!(exchange, "exchange ready");
        Ok(())
    }

    async fn publish(&self, exchange: &str, topic: &str, body: Bytes) -> Result<()> {
        let subject = Self::subject(exchange, topic);
        tracing::debug!(subject = subject, "publishing event");

        self.client
            .publish(subject.clone(), body)
            .await
            .map_err(|e| BrokerError::Publish(format!("failed to publish to {subject}: {e}")))?;
        self.client
            .flush()
            .await
            .map_err(|e| BrokerError::Publish(format!("failed to flush {subject}: {e}")))?;
        Ok(())
    }

    async fn subscribe(&self, exchange: &str, topics: &[&str]) -> Result<MessageStream> {
        let mut streams = Vec::with_capacity(topics.len());

        for topic in topics {
            let subject = Self::subject(exchange, topic);
            let subscriber = self.client.subscribe(subject.clone()).await.map_err(|e| {
                BrokerError::Subscribe(format!("failed to subscribe to {subject}: {e}"))
            })?;
            tracing::debug!(subject = subject, "subscribed");

            let topic = topic.to_string();
            streams.push(
                subscriber
                    .map(move |message| BrokerMessage {
                        topic: topic.clone(),
                        body: message.payload,
                    })
                    .boxed(),
            );
        }

        Ok(Box::pin(futures_util::stream::select_all(streams)))
    }
}
