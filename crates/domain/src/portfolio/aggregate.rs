//! Portfolio aggregate implementation.

use common::{AggregateId, CorrelationId};

use crate::aggregate::{Aggregate, EventQueue};
use crate::error::DomainError;

use super::value_objects::validate_assets;
use super::{
    CreatePortfolio, PortfolioAsset, PortfolioCreated, PortfolioDeleted, PortfolioEvent,
    PortfolioUpdated,
};

/// Portfolio aggregate root.
///
/// A named set of weighted asset lines. Every mutation goes through a method
/// that records the matching event.
#[derive(Debug, Clone)]
pub struct Portfolio {
    id: AggregateId,
    name: String,
    assets: Vec<PortfolioAsset>,
    version_number: u64,
    events: EventQueue<PortfolioEvent>,
}

impl Aggregate for Portfolio {
    type Event = PortfolioEvent;

    fn aggregate_type() -> &'static str {
        "Portfolio"
    }

    fn id(&self) -> &AggregateId {
        &self.id
    }

    fn version_number(&self) -> u64 {
        self.version_number
    }

    fn events(&self) -> &EventQueue<Self::Event> {
        &self.events
    }

    fn events_mut(&mut self) -> &mut EventQueue<Self::Event> {
        &mut self.events
    }
}

// Construction
impl Portfolio {
    /// Builds a new portfolio from a create command and records `PortfolioCreated`.
    pub fn from_command(command: &CreatePortfolio) -> Result<Self, DomainError> {
        let assets = PortfolioAsset::from_weights(&command.assets);
        validate_name(&command.name)?;
        validate_assets(&assets)?;

        let mut portfolio = Self::restore(command.id.clone(), command.name.clone(), assets, 0);
        portfolio.allocate(command.correlation_id.clone());
        Ok(portfolio)
    }

    /// Rebuilds a portfolio from stored state without recording anything.
    pub fn restore(
        id: AggregateId,
        name: String,
        assets: Vec<PortfolioAsset>,
        version_number: u64,
    ) -> Self {
        Self {
            id,
            name,
            assets,
            version_number,
            events: EventQueue::new(),
        }
    }
}

// Commands
impl Portfolio {
    /// Marks the portfolio as allocated.
    pub fn allocate(&mut self, correlation_id: CorrelationId) {
        self.events
            .record(PortfolioEvent::Created(PortfolioCreated {
                id: self.id.clone(),
                correlation_id,
            }));
    }

    /// Replaces the name and asset lines.
    pub fn update(
        &mut self,
        name: impl Into<String>,
        assets: Vec<PortfolioAsset>,
        correlation_id: CorrelationId,
    ) -> Result<(), DomainError> {
        let name = name.into();
        validate_name(&name)?;
        validate_assets(&assets)?;

        self.name = name;
        self.assets = assets;
        self.version_number += 1;
        self.events
            .record(PortfolioEvent::Updated(PortfolioUpdated {
                id: self.id.clone(),
                correlation_id,
            }));
        Ok(())
    }

    /// Clears every asset line and records the terminal `PortfolioDeleted`.
    pub fn deallocate(&mut self, correlation_id: CorrelationId) {
        self.assets.clear();
        self.version_number += 1;
        self.events
            .record(PortfolioEvent::Deleted(PortfolioDeleted {
                id: self.id.clone(),
                correlation_id,
            }));
    }
}

// Queries
impl Portfolio {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the asset lines in stored order.
    pub fn assets(&self) -> &[PortfolioAsset] {
        &self.assets
    }

    /// Returns the asset line for a symbol.
    pub fn asset(&self, symbol: &str) -> Option<&PortfolioAsset> {
        self.assets.iter().find(|asset| asset.symbol == symbol)
    }

    /// Returns the sum of all weights.
    pub fn total_weight(&self) -> f64 {
        self.assets.iter().map(|asset| asset.weight).sum()
    }
}

fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("Portfolio name must not be empty"));
    }
    Ok(())
}
