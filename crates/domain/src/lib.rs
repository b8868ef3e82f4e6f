//! Domain layer for the portfolio message bus.
//!
//! This crate provides the core domain abstractions including:
//! - Aggregate trait and the FIFO event queue every aggregate owns
//! - DomainEvent and Command traits for messages routed by the bus
//! - TopicRegistry for rebuilding typed events from broker payloads
//! - Portfolio aggregate with its commands and events

pub mod aggregate;
pub mod command;
pub mod error;
pub mod portfolio;
pub mod topic;

pub use aggregate::{Aggregate, DomainEvent, EventQueue};
pub use command::{Command, CommandRequest, NamedCommand};
pub use common::{AggregateId, CorrelationId};
pub use error::DomainError;
pub use portfolio::{
    CreatePortfolio, DeletePortfolio, Portfolio, PortfolioAsset, PortfolioCommand,
    PortfolioCreated, PortfolioDeleted, PortfolioEvent, PortfolioUpdated, UpdatePortfolio,
};
pub use topic::TopicRegistry;
