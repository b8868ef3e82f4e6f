use async_trait::async_trait;
use domain::Aggregate;

use crate::{Repository, RepositoryBackend, Result, StorageError};

/// Lifecycle of a unit of work. `Committed` and `RolledBack` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    Active,
    Committed,
    RolledBack,
}

/// A transactional scope binding one repository to one storage session.
///
/// Nothing written through the repository is visible elsewhere until
/// [`commit`](Self::commit) succeeds. [`close`](Self::close) rolls back any
/// scope that is still active, so leaving without committing is always safe.
/// Dropping an active scope discards its writes as well.
pub struct UnitOfWork<A: Aggregate, B> {
    repository: Repository<A, B>,
    state: UnitOfWorkState,
}

impl<A, B> UnitOfWork<A, B>
where
    A: Aggregate,
    B: RepositoryBackend<A>,
{
    /// Opens a scope over a fresh storage session.
    pub fn new(backend: B) -> Self {
        Self {
            repository: Repository::new(backend),
            state: UnitOfWorkState::Active,
        }
    }

    pub fn repository(&mut self) -> &mut Repository<A, B> {
        &mut self.repository
    }

    pub fn state(&self) -> UnitOfWorkState {
        self.state
    }

    /// Makes every change in this scope durable.
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != UnitOfWorkState::Active {
            return Err(StorageError::InvalidState("commit on a finished unit of work"));
        }

        if let Err(e) = self.repository.backend_mut().commit().await {
            tracing::warn!(aggregate_type = A::aggregate_type(), error = %e, "commit failed");
            self.repository.forget();
            self.state = UnitOfWorkState::RolledBack;
            return Err(e);
        }

        self.state = UnitOfWorkState::Committed;
        metrics::counter!("unit_of_work_commits_total").increment(1);
        tracing::debug!(aggregate_type = A::aggregate_type(), "unit of work committed");
        Ok(())
    }

    /// Discards every change in this scope.
    ///
    /// Rolling back a scope that already finished is a no-op.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.state != UnitOfWorkState::Active {
            return Ok(());
        }

        self.repository.forget();
        self.state = UnitOfWorkState::RolledBack;
        self.repository.backend_mut().rollback().await?;

        metrics::counter!("unit_of_work_rollbacks_total").increment(1);
        tracing::debug!(aggregate_type = A::aggregate_type(), "unit of work rolled back");
        Ok(())
    }

    /// Ends the scope, rolling back if `commit` was never called.
    pub async fn close(&mut self) -> Result<()> {
        self.rollback().await
    }

    /// Drains the events recorded by every aggregate this scope touched.
    ///
    /// Events are yielded only after a successful commit. Each aggregate's
    /// events come out in the order they were recorded; aggregates come out
    /// in the order the scope first touched them. A second call returns
    /// nothing.
    pub fn collect_new_events(&mut self) -> Vec<A::Event> {
        if self.state != UnitOfWorkState::Committed {
            return Vec::new();
        }
        self.repository.take_new_events()
    }
}

/// Opens units of work over a particular storage engine.
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync + 'static {
    type Aggregate: Aggregate;
    type Backend: RepositoryBackend<Self::Aggregate> + 'static;

    /// Starts a new scope with its own storage session.
    async fn begin(&self) -> Result<UnitOfWork<Self::Aggregate, Self::Backend>>;
}
