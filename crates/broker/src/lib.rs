//! Cross-process event propagation.
//!
//! This crate connects a local [`messagebus::MessageBus`] to a message broker:
//! - [`Broker`] trait with [`InMemoryBroker`] and [`NatsBroker`] implementations
//! - [`EventPublisher`] and [`PublishEventHandler`] for outbound events
//! - [`EventConsumer`] for inbound messages, run on a dedicated thread
//!
//! Delivery is at-most-once in both directions. A failed publish is logged
//! and the event is dropped; an inbound message that fails to decode or
//! handle is logged and never redelivered.

pub mod broker;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod nats;
pub mod publisher;

pub use broker::{Broker, BrokerMessage, MessageStream};
pub use consumer::{EventConsumer, spawn_consumer};
pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use nats::NatsBroker;
pub use publisher::{EventPublisher, PublishEventHandler};
