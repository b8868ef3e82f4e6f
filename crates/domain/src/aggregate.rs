//! Core aggregate and domain event traits.

use std::collections::VecDeque;

use common::{AggregateId, CorrelationId};
use serde::Serialize;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Returns the stable topic string used for routing and reconstruction.
    fn topic(&self) -> &'static str;

    /// Returns the correlation ID inherited from the triggering command.
    fn correlation_id(&self) -> &CorrelationId;

    /// Returns the ID of the aggregate that recorded this event.
    fn aggregate_id(&self) -> &AggregateId;

    /// Serializes the event into its broker message body.
    fn to_message(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Ordered queue of events an aggregate has recorded but nobody has harvested.
#[derive(Debug, Clone)]
pub struct EventQueue<E> {
    pending: VecDeque<E>,
}

impl<E> EventQueue<E> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Appends an event to the tail of the queue.
    pub fn record(&mut self, event: E) {
        self.pending.push_back(event);
    }

    /// Removes every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<E> {
        self.pending.drain(..).collect()
    }

    /// Returns the queued events without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for aggregates whose mutations are recorded as domain events.
///
/// An aggregate is a consistency boundary. Its methods change state and
/// append an event describing the change; the unit of work harvests those
/// events after a successful commit.
pub trait Aggregate: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// The type of events this aggregate records.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> &AggregateId;

    /// Returns the current version number.
    fn version_number(&self) -> u64;

    /// Returns the queue of events recorded since the last harvest.
    fn events(&self) -> &EventQueue<Self::Event>;

    /// Returns the queue of events for mutation.
    fn events_mut(&mut self) -> &mut EventQueue<Self::Event>;

    /// Drains every pending event in the order it was recorded.
    fn take_events(&mut self) -> Vec<Self::Event> {
        self.events_mut().drain()
    }
}
