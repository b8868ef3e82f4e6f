//! Per-connection delivery loop.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_core::Stream;
use tokio::sync::mpsc;

use crate::ClientStreams;

/// One item of a client stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Nothing arrived within the heartbeat interval.
    Heartbeat,
    Payload(String),
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send>>;

/// A registered client queue.
///
/// Dropping the subscription removes its queue from the registry, whether
/// the stream ended normally or the client went away mid-write.
#[derive(Debug)]
pub struct ClientSubscription {
    streams: Arc<ClientStreams>,
    topic: String,
    sender: mpsc::Sender<String>,
    receiver: mpsc::Receiver<String>,
}

impl ClientSubscription {
    pub(crate) fn new(
        streams: Arc<ClientStreams>,
        topic: String,
        sender: mpsc::Sender<String>,
        receiver: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            streams,
            topic,
            sender,
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits up to `heartbeat` for the next payload.
    pub async fn next_frame(&mut self, heartbeat: Duration) -> Frame {
        match tokio::time::timeout(heartbeat, self.receiver.recv()).await {
            Ok(Some(payload)) => Frame::Payload(payload),
            // The subscription holds a sender, so the queue cannot close
            // while it is alive. Treat it as idle all the same.
            Ok(None) | Err(_) => Frame::Heartbeat,
        }
    }

    /// Turns the subscription into an endless stream of frames.
    pub fn into_stream(self, heartbeat: Duration) -> FrameStream {
        Box::pin(futures_util::stream::unfold(self, move |mut subscription| async move {
            let frame = subscription.next_frame(heartbeat).await;
            Some((frame, subscription))
        }))
    }
}

impl Drop for ClientSubscription {
    fn drop(&mut self) {
        self.streams.remove_topic_queue(&self.topic, &self.sender);
    }
}
