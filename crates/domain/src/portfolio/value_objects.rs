//! Value objects for the portfolio domain.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A weighted asset line owned by a portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioAsset {
    /// Ticker symbol.
    pub symbol: String,

    /// Allocation weight.
    pub weight: f64,
}

impl PortfolioAsset {
    /// Creates a new asset line.
    pub fn new(symbol: impl Into<String>, weight: f64) -> Self {
        Self {
            symbol: symbol.into(),
            weight,
        }
    }

    /// Builds asset lines from a symbol → weight map, sorted by symbol.
    pub fn from_weights(weights: &BTreeMap<String, f64>) -> Vec<Self> {
        weights
            .iter()
            .map(|(symbol, weight)| Self::new(symbol.clone(), *weight))
            .collect()
    }

    /// Checks a single line.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.symbol.trim().is_empty() {
            return Err(DomainError::validation("Asset symbol must not be empty"));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(DomainError::validation(format!(
                "Invalid weight for {}: {} (must be a finite, non-negative number)",
                self.symbol, self.weight
            )));
        }
        Ok(())
    }
}

/// Checks every line and rejects duplicate symbols.
pub(crate) fn validate_assets(assets: &[PortfolioAsset]) -> Result<(), DomainError> {
    let mut symbols = HashSet::with_capacity(assets.len());
    for asset in assets {
        asset.validate()?;
        if !symbols.insert(asset.symbol.as_str()) {
            return Err(DomainError::validation(format!(
                "Duplicate asset symbol: {}",
                asset.symbol
            )));
        }
    }
    Ok(())
}
