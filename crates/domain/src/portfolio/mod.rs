//! Portfolio aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod value_objects;

pub use aggregate::Portfolio;
pub use commands::{CreatePortfolio, DeletePortfolio, PortfolioCommand, UpdatePortfolio};
pub use events::{PortfolioCreated, PortfolioDeleted, PortfolioEvent, PortfolioUpdated};
pub use value_objects::PortfolioAsset;
