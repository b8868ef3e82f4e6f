//! Portfolio domain events.

use common::{AggregateId, CorrelationId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::error::DomainError;
use crate::topic::{Decoder, TopicRegistry};

/// Events that can occur on a portfolio aggregate.
///
/// Serialized without a tag: the topic identifies the variant, the body is
/// just `{"id": ..., "correlation_id": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PortfolioEvent {
    /// Portfolio was created.
    Created(PortfolioCreated),

    /// Portfolio name or assets were replaced.
    Updated(PortfolioUpdated),

    /// Portfolio was deallocated and removed.
    Deleted(PortfolioDeleted),
}

impl PortfolioEvent {
    pub const CREATED: &'static str = "events.portfolio.created";
    pub const UPDATED: &'static str = "events.portfolio.updated";
    pub const DELETED: &'static str = "events.portfolio.deleted";

    /// Builds the topic table for every portfolio event.
    pub fn registry() -> Result<TopicRegistry<Self>, DomainError> {
        TopicRegistry::from_entries(&[
            (Self::CREATED, decode_created as Decoder<Self>),
            (Self::UPDATED, decode_updated as Decoder<Self>),
            (Self::DELETED, decode_deleted as Decoder<Self>),
        ])
    }

    /// Returns the portfolio ID carried by the event.
    pub fn id(&self) -> &AggregateId {
        match self {
            PortfolioEvent::Created(data) => &data.id,
            PortfolioEvent::Updated(data) => &data.id,
            PortfolioEvent::Deleted(data) => &data.id,
        }
    }
}

impl DomainEvent for PortfolioEvent {
    fn topic(&self) -> &'static str {
        match self {
            PortfolioEvent::Created(_) => Self::CREATED,
            PortfolioEvent::Updated(_) => Self::UPDATED,
            PortfolioEvent::Deleted(_) => Self::DELETED,
        }
    }

    fn correlation_id(&self) -> &CorrelationId {
        match self {
            PortfolioEvent::Created(data) => &data.correlation_id,
            PortfolioEvent::Updated(data) => &data.correlation_id,
            PortfolioEvent::Deleted(data) => &data.correlation_id,
        }
    }

    fn aggregate_id(&self) -> &AggregateId {
        self.id()
    }
}

/// Data for the PortfolioCreated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioCreated {
    pub id: AggregateId,
    #[serde(default)]
    pub correlation_id: CorrelationId,
}

/// Data for the PortfolioUpdated event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioUpdated {
    pub id: AggregateId,
    #[serde(default)]
    pub correlation_id: CorrelationId,
}

/// Data for the PortfolioDeleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioDeleted {
    pub id: AggregateId,
    #[serde(default)]
    pub correlation_id: CorrelationId,
}

fn decode_created(body: &[u8]) -> Result<PortfolioEvent, serde_json::Error> {
    serde_json::from_slice(body).map(PortfolioEvent::Created)
}

fn decode_updated(body: &[u8]) -> Result<PortfolioEvent, serde_json::Error> {
    serde_json::from_slice(body).map(PortfolioEvent::Updated)
}

fn decode_deleted(body: &[u8]) -> Result<PortfolioEvent, serde_json::Error> {
    serde_json::from_slice(body).map(PortfolioEvent::Deleted)
}
