//! Topic → subscriber queue registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::ClientSubscription;

/// Queue capacity used by [`ClientStreams::new`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Registry of live client queues keyed by topic.
///
/// All mutation happens under one mutex. Broadcasting copies the subscriber
/// list under the lock and enqueues outside it, so a slow or departing
/// subscriber never holds up the publisher or the other subscribers.
#[derive(Debug)]
pub struct ClientStreams {
    streams: Mutex<HashMap<String, Vec<mpsc::Sender<String>>>>,
    capacity: usize,
}

impl Default for ClientStreams {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientStreams {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a registry whose subscriptions buffer up to `capacity` payloads.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Opens a bounded queue for `topic` and registers it.
    pub fn subscribe(self: &Arc<Self>, topic: impl Into<String>) -> ClientSubscription {
        let topic = topic.into();
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.add_topic_queue(&topic, sender.clone());
        ClientSubscription::new(Arc::clone(self), topic, sender, receiver)
    }

    /// Appends a queue under `topic`, creating the topic entry if needed.
    pub fn add_topic_queue(&self, topic: &str, queue: mpsc::Sender<String>) {
        self.streams
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(queue);

        metrics::gauge!("client_streams_subscribers").increment(1.0);
        tracing::debug!(topic, "client stream opened");
    }

    /// Removes a queue from `topic`, dropping the topic once it is empty.
    ///
    /// Returns `false` if the queue was not registered.
    pub fn remove_topic_queue(&self, topic: &str, queue: &mpsc::Sender<String>) -> bool {
        let mut streams = self.streams.lock();
        let Some(queues) = streams.get_mut(topic) else {
            return false;
        };
        let Some(position) = queues.iter().position(|q| q.same_channel(queue)) else {
            return false;
        };

        queues.swap_remove(position);
        if queues.is_empty() {
            streams.remove(topic);
        }
        drop(streams);

        metrics::gauge!("client_streams_subscribers").decrement(1.0);
        tracing::debug!(topic, "client stream closed");
        true
    }

    /// Offers `payload` to every queue on `topic` without waiting.
    ///
    /// Full queues skip this payload. Returns the number of queues that
    /// accepted it.
    pub fn broadcast_topic(&self, topic: &str, payload: &str) -> usize {
        let queues = match self.streams.lock().get(topic) {
            Some(queues) => queues.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        for queue in queues {
            match queue.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    metrics::counter!("client_streams_payloads_dropped_total", "topic" => topic.to_string())
                        .increment(1);
                    tracing::debug!(topic, "client queue full, payload dropped");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        self.streams.lock().contains_key(topic)
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.streams.lock().get(topic).map_or(0, Vec::len)
    }
}
