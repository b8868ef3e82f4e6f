//! Read-only portfolio views.
//!
//! Views open a unit of work, read, and close it without committing.

use common::AggregateId;
use domain::{Aggregate, Portfolio};
use serde::Serialize;
use unit_of_work::{StorageError, UnitOfWorkFactory};

/// A single asset line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetView {
    pub symbol: String,
    pub weight: f64,
}

/// A portfolio as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioView {
    pub id: String,
    pub name: String,
    pub version_number: u64,
    pub assets: Vec<AssetView>,
}

impl From<&Portfolio> for PortfolioView {
    fn from(portfolio: &Portfolio) -> Self {
        Self {
            id: portfolio.id().to_string(),
            name: portfolio.name().to_string(),
            version_number: portfolio.version_number(),
            assets: portfolio
                .assets()
                .iter()
                .map(|asset| AssetView {
                    symbol: asset.symbol.clone(),
                    weight: asset.weight,
                })
                .collect(),
        }
    }
}

/// Lists every portfolio, ordered by ID.
#[tracing::instrument(skip(factory))]
pub async fn list_portfolios<F>(factory: &F) -> Result<Vec<PortfolioView>, StorageError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let mut uow = factory.begin().await?;
    let portfolios = uow.repository().list().await;
    uow.close().await?;

    Ok(portfolios?.iter().map(PortfolioView::from).collect())
}

/// Returns one portfolio, or `None` if it does not exist.
#[tracing::instrument(skip(factory))]
pub async fn get_portfolio<F>(
    factory: &F,
    id: &AggregateId,
) -> Result<Option<PortfolioView>, StorageError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let mut uow = factory.begin().await?;
    let portfolio = uow.repository().get(id).await;
    uow.close().await?;

    Ok(portfolio?.as_ref().map(PortfolioView::from))
}
