use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{Broker, BrokerError, BrokerMessage, MessageStream, Result};

#[derive(Debug)]
struct Binding {
    topics: HashSet<String>,
    queue: mpsc::UnboundedSender<BrokerMessage>,
}

/// In-process broker for tests and single-process deployments.
///
/// Cloning shares the exchanges. Closed subscriptions are pruned on publish.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    exchanges: Arc<Mutex<HashMap<String, Vec<Binding>>>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live subscriptions on an exchange.
    pub fn subscription_count(&self, exchange: &str) -> usize {
        self.exchanges
            .lock()
            .get(exchange)
            .map(|bindings| bindings.iter().filter(|b| !b.queue.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_exchange(&self, exchange: &str) -> Result<()> {
        self.exchanges
            .lock()
            .entry(exchange.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, exchange: &str, topic: &str, body: Bytes) -> Result<()> {
        let mut exchanges = self.exchanges.lock();
        let bindings = exchanges
            .get_mut(exchange)
            .ok_or_else(|| BrokerError::Publish(format!("exchange {exchange} not declared")))?;

        bindings.retain(|binding| {
            if !binding.topics.contains(topic) {
                return !binding.queue.is_closed();
            }
            binding
                .queue
                .send(BrokerMessage {
                    topic: topic.to_string(),
                    body: body.clone(),
                })
                .is_ok()
        });
        Ok(())
    }

    async fn subscribe(&self, exchange: &str, topics: &[&str]) -> Result<MessageStream> {
        let (tx, rx) = mpsc::unbounded_channel();

        self.exchanges
            .lock()
            .entry(exchange.to_string())
            .or_default()
            .push(Binding {
                topics: topics.iter().map(|t| t.to_string()).collect(),
                queue: tx,
            });

        Ok(Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|message| (message, rx))
        })))
    }
}
