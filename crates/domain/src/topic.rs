//! Static topic → event type table.

use std::collections::HashMap;

use crate::error::DomainError;

/// Decodes a broker message body into a typed event.
pub type Decoder<E> = fn(&[u8]) -> Result<E, serde_json::Error>;

/// Maps topic strings to the decoder for the event type published on them.
///
/// Built once during start-up. Registering the same topic twice is an error,
/// so a misconfigured table fails before any message is consumed.
pub struct TopicRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> TopicRegistry<E> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Builds a registry from a fixed table of entries.
    pub fn from_entries(entries: &[(&'static str, Decoder<E>)]) -> Result<Self, DomainError> {
        entries
            .iter()
            .try_fold(Self::new(), |registry, (topic, decoder)| {
                registry.register(topic, *decoder)
            })
    }

    /// Adds a topic, failing if it is already taken.
    pub fn register(mut self, topic: &'static str, decoder: Decoder<E>) -> Result<Self, DomainError> {
        if self.decoders.insert(topic, decoder).is_some() {
            return Err(DomainError::DuplicateTopic(topic));
        }
        Ok(self)
    }

    /// Returns true if the topic has a registered event type.
    pub fn contains(&self, topic: &str) -> bool {
        self.decoders.contains_key(topic)
    }

    /// Returns every registered topic in sorted order.
    pub fn topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<_> = self.decoders.keys().copied().collect();
        topics.sort_unstable();
        topics
    }

    /// Reconstructs a typed event from a topic and message body.
    pub fn decode(&self, topic: &str, body: &[u8]) -> Result<E, DomainError> {
        let decoder = self
            .decoders
            .get(topic)
            .ok_or_else(|| DomainError::UnknownTopic(topic.to_string()))?;
        Ok(decoder(body)?)
    }
}

impl<E> Default for TopicRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for TopicRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            decoders: self.decoders.clone(),
        }
    }
}

impl<E> std::fmt::Debug for TopicRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}
