//! Command and event dispatch.
//!
//! This crate provides the dispatching core:
//! - [`MessageBus`] routing each command to exactly one [`CommandHandler`]
//!   and each event to zero or more [`EventHandler`]s
//! - [`HandlerError`] / [`BusError`] with an [`ErrorKind`] taxonomy adapters
//!   can map onto transport status codes
//! - Portfolio command handlers and read-only portfolio views

pub mod bus;
pub mod error;
pub mod handler;
pub mod portfolio;
pub mod views;

pub use bus::{EventOf, Message, MessageBus, MessageBusBuilder, PortfolioBus};
pub use error::{BusError, ErrorKind, HandlerError};
pub use handler::{CommandHandler, EventHandler};
pub use portfolio::{
    CreatePortfolioHandler, DeletePortfolioHandler, UpdatePortfolioHandler, portfolio_bus,
};
pub use views::{AssetView, PortfolioView, get_portfolio, list_portfolios};
