//! Transactional scope for command handlers.
//!
//! A [`UnitOfWork`] binds one [`Repository`] to one storage session. Handlers
//! read and write aggregates through the repository, call `commit()` to make
//! their changes durable, and the bus harvests the events recorded on every
//! aggregate the scope touched via `collect_new_events()`.
//!
//! Two storage implementations are provided:
//! - [`InMemoryStorage`] for tests and single-process deployments
//! - [`PostgresStorage`] backed by one database transaction per scope

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod unit_of_work;

pub use common::AggregateId;
pub use error::{Result, StorageError};
pub use memory::{InMemoryBackend, InMemoryStorage};
pub use postgres::{PostgresBackend, PostgresStorage};
pub use repository::{Repository, RepositoryBackend};
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory, UnitOfWorkState};
