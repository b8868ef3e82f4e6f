//! Inbound event consumer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use domain::{Command, TopicRegistry};
use futures_util::StreamExt;
use messagebus::{EventOf, MessageBus};
use unit_of_work::UnitOfWorkFactory;

use crate::{Broker, BrokerError, BrokerMessage, MessageStream, Result};

/// Feeds broker messages back into a local bus.
///
/// The consumer binds one exclusive subscription to every topic the bus has
/// an event handler for, rebuilds each message into a typed event through
/// the topic registry, and hands it to the bus. Messages are acknowledged on
/// receipt: a decode or handling failure is logged and the message is gone.
pub struct EventConsumer<F: UnitOfWorkFactory, C> {
    broker: Arc<dyn Broker>,
    exchange: String,
    bus: Arc<MessageBus<F, C>>,
    registry: TopicRegistry<EventOf<F>>,
}

impl<F, C> EventConsumer<F, C>
where
    F: UnitOfWorkFactory,
    C: Command,
{
    pub fn new(
        broker: Arc<dyn Broker>,
        exchange: impl Into<String>,
        bus: Arc<MessageBus<F, C>>,
        registry: TopicRegistry<EventOf<F>>,
    ) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
            bus,
            registry,
        }
    }

    /// Consumes until the subscription ends.
    ///
    /// Returns immediately if the bus has no event handlers.
    #[tracing::instrument(skip_all, fields(exchange = %self.exchange))]
    pub async fn run(self) -> Result<()> {
        let topics = self.bus.subscribed_topics();
        if topics.is_empty() {
            tracing::info!("no event handlers registered, consumer not started");
            return Ok(());
        }

        for topic in topics.iter().filter(|t| !self.registry.contains(t)) {
            tracing::warn!(topic, "subscribed topic has no registered event type");
        }

        let mut messages = match self.listen(&topics).await {
            Ok(messages) => messages,
            Err(e) => {
                metrics::counter!("broker_consumer_failures_total").increment(1);
                tracing::error!(error = %e, ?topics, "consumer failed to subscribe");
                return Err(e);
            }
        };
        tracing::info!(?topics, "consumer listening");

        while let Some(message) = messages.next().await {
            self.process(message).await;
        }

        tracing::info!("subscription closed, consumer stopping");
        Ok(())
    }

    async fn listen(&self, topics: &[&str]) -> Result<MessageStream> {
        self.broker.declare_exchange(&self.exchange).await?;
        self.broker.subscribe(&self.exchange, topics).await
    }

    /// Decodes one message and dispatches the resulting event.
    pub async fn process(&self, message: BrokerMessage) {
        metrics::counter!("broker_messages_received_total").increment(1);

        let event = match self.registry.decode(&message.topic, &message.body) {
            Ok(event) => event,
            Err(e) => {
                metrics::counter!("broker_messages_rejected_total").increment(1);
                tracing::warn!(topic = %message.topic, error = %e, "dropping undecodable message");
                return;
            }
        };

        if let Err(e) = self.bus.notify(event).await {
            tracing::error!(topic = %message.topic, error = ?e, "failed to handle inbound event");
        }
    }
}

/// Runs a consumer on its own OS thread with a single-threaded runtime.
///
/// Keeps broker traffic off the threads that serve requests.
pub fn spawn_consumer<F, C>(consumer: EventConsumer<F, C>) -> Result<JoinHandle<Result<()>>>
where
    F: UnitOfWorkFactory,
    C: Command,
{
    thread::Builder::new()
        .name("event-consumer".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    metrics::counter!("broker_consumer_failures_total").increment(1);
                    tracing::error!(error = %e, "failed to start consumer runtime");
                    return Err(BrokerError::Connection(format!(
                        "failed to start runtime: {e}"
                    )));
                }
            };
            runtime.block_on(consumer.run())
        })
        .map_err(|e| BrokerError::Connection(format!("failed to spawn consumer thread: {e}")))
}
