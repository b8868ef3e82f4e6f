//! Live client streams.
//!
//! [`ClientStreams`] is a topic → subscriber registry shared by every open
//! streaming connection. Broadcasting never blocks: a subscriber whose queue
//! is full misses the payload. [`ClientSubscription`] owns one subscriber
//! queue and removes it from the registry when dropped.

pub mod handler;
pub mod registry;
pub mod subscription;

pub use handler::StreamBroadcastHandler;
pub use registry::{ClientStreams, DEFAULT_QUEUE_CAPACITY};
pub use subscription::{ClientSubscription, Frame, FrameStream};
