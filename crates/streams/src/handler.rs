use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use domain::DomainEvent;
use messagebus::{EventHandler, HandlerError};

use crate::ClientStreams;

/// Event handler that broadcasts each event's message body to the clients
/// streaming its topic.
pub struct StreamBroadcastHandler<E> {
    streams: Arc<ClientStreams>,
    _event: PhantomData<fn(E)>,
}

impl<E> StreamBroadcastHandler<E> {
    pub fn new(streams: Arc<ClientStreams>) -> Self {
        Self {
            streams,
            _event: PhantomData,
        }
    }
}

#[async_trait]
impl<E: DomainEvent> EventHandler<E> for StreamBroadcastHandler<E> {
    fn name(&self) -> &'static str {
        "stream_broadcast"
    }

    async fn handle(&self, event: &E) -> Result<(), HandlerError> {
        let body = event.to_message().map_err(HandlerError::internal)?;
        let payload = String::from_utf8(body).map_err(HandlerError::internal)?;

        let delivered = self.streams.broadcast_topic(event.topic(), &payload);
        tracing::debug!(topic = event.topic(), delivered, "event broadcast to clients");
        Ok(())
    }
}
