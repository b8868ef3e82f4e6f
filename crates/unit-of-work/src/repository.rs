use async_trait::async_trait;
use common::AggregateId;
use domain::Aggregate;

use crate::Result;

/// Storage session behind a repository.
///
/// One backend instance lives for exactly one unit of work. Reads see the
/// session's own uncommitted writes; nothing becomes visible to other
/// sessions until `commit` succeeds.
#[async_trait]
pub trait RepositoryBackend<A: Aggregate>: Send {
    /// Stores a new aggregate.
    ///
    /// Fails with [`StorageError::Conflict`](crate::StorageError::Conflict)
    /// if another session already holds the ID, at the latest on `commit`.
    async fn insert(&mut self, aggregate: &A) -> Result<()>;

    /// Inserts or replaces an aggregate.
    async fn add(&mut self, aggregate: &A) -> Result<()>;

    /// Loads an aggregate, returning `None` if it does not exist.
    async fn get(&mut self, id: &AggregateId) -> Result<Option<A>>;

    /// Removes an aggregate. Removing a missing aggregate is not an error.
    async fn delete(&mut self, id: &AggregateId) -> Result<()>;

    /// Loads every aggregate, ordered by ID.
    async fn list(&mut self) -> Result<Vec<A>>;

    /// Makes the session's writes durable.
    async fn commit(&mut self) -> Result<()>;

    /// Discards the session's writes.
    async fn rollback(&mut self) -> Result<()>;
}

#[derive(Debug)]
struct Tracked<A> {
    aggregate: A,
    deleted: bool,
}

/// Repository that remembers every aggregate it hands out or accepts.
///
/// The "seen" list is an identity map kept in first-touch order. A second
/// `get` for the same ID returns the tracked copy, so a handler always works
/// on the latest in-scope state, and event harvesting walks aggregates in the
/// order the scope first touched them.
pub struct Repository<A: Aggregate, B> {
    backend: B,
    seen: Vec<Tracked<A>>,
}

impl<A, B> Repository<A, B>
where
    A: Aggregate,
    B: RepositoryBackend<A>,
{
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            seen: Vec::new(),
        }
    }

    /// Stores an aggregate that must not exist yet.
    pub async fn insert(&mut self, aggregate: A) -> Result<()> {
        self.backend.insert(&aggregate).await?;
        self.track(aggregate, false);
        Ok(())
    }

    /// Stores a new or modified aggregate.
    pub async fn add(&mut self, aggregate: A) -> Result<()> {
        self.backend.add(&aggregate).await?;
        self.track(aggregate, false);
        Ok(())
    }

    /// Returns the aggregate with the given ID, or `None` if it doesn't exist.
    pub async fn get(&mut self, id: &AggregateId) -> Result<Option<A>> {
        if let Some(tracked) = self.seen.iter().find(|t| t.aggregate.id() == id) {
            return Ok((!tracked.deleted).then(|| tracked.aggregate.clone()));
        }

        let found = self.backend.get(id).await?;
        if let Some(aggregate) = &found {
            self.track(aggregate.clone(), false);
        }
        Ok(found)
    }

    /// Removes an aggregate, keeping it tracked so its final events are harvested.
    pub async fn delete(&mut self, aggregate: A) -> Result<()> {
        self.backend.delete(aggregate.id()).await?;
        self.track(aggregate, true);
        Ok(())
    }

    /// Returns every aggregate, preferring tracked copies.
    pub async fn list(&mut self) -> Result<Vec<A>> {
        let stored = self.backend.list().await?;
        let mut aggregates = Vec::with_capacity(stored.len());

        for aggregate in stored {
            match self.seen.iter().find(|t| t.aggregate.id() == aggregate.id()) {
                Some(tracked) if tracked.deleted => {}
                Some(tracked) => aggregates.push(tracked.aggregate.clone()),
                None => {
                    self.track(aggregate.clone(), false);
                    aggregates.push(aggregate);
                }
            }
        }
        Ok(aggregates)
    }

    /// Returns the IDs of every aggregate touched so far, in first-touch order.
    pub fn seen(&self) -> Vec<&AggregateId> {
        self.seen.iter().map(|t| t.aggregate.id()).collect()
    }

    /// Drains pending events from every tracked aggregate in first-touch order.
    pub(crate) fn take_new_events(&mut self) -> Vec<A::Event> {
        self.seen
            .iter_mut()
            .flat_map(|t| t.aggregate.take_events())
            .collect()
    }

    /// Forgets every tracked aggregate along with its pending events.
    pub(crate) fn forget(&mut self) {
        self.seen.clear();
    }

    pub(crate) fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn track(&mut self, aggregate: A, deleted: bool) {
        match self
            .seen
            .iter_mut()
            .find(|t| t.aggregate.id() == aggregate.id())
        {
            Some(tracked) => {
                tracked.aggregate = aggregate;
                tracked.deleted = deleted;
            }
            None => self.seen.push(Tracked { aggregate, deleted }),
        }
    }
}
