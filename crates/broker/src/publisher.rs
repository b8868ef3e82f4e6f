//! Outbound event propagation.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use domain::DomainEvent;
use messagebus::{EventHandler, HandlerError};

use crate::{Broker, Result};

/// Publishes local events to a named exchange, keyed by topic.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Ensures the exchange exists, then publishes the event's message body.
    #[tracing::instrument(
        skip_all,
        fields(topic = event.topic(), correlation_id = %event.correlation_id())
    )]
    pub async fn publish<E: DomainEvent>(&self, event: &E) -> Result<()> {
        let body = Bytes::from(event.to_message()?);
        self.broker.declare_exchange(&self.exchange).await?;
        self.broker
            .publish(&self.exchange, event.topic(), body)
            .await?;

        metrics::counter!("broker_messages_published_total", "topic" => event.topic())
            .increment(1);
        tracing::debug!(exchange = %self.exchange, "event published");
        Ok(())
    }
}

/// Event handler that forwards every event it receives to the broker.
///
/// A publish failure is reported to the bus as an internal error, which the
/// bus logs and swallows. The event is not retried.
pub struct PublishEventHandler<E> {
    publisher: EventPublisher,
    _event: PhantomData<fn(E)>,
}

impl<E> PublishEventHandler<E> {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E: DomainEvent> EventHandler<E> for PublishEventHandler<E> {
    fn name(&self) -> &'static str {
        "publish_event"
    }

    async fn handle(&self, event: &E) -> std::result::Result<(), HandlerError> {
        self.publisher
            .publish(event)
            .await
            .map_err(HandlerError::internal)
    }
}
