use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::AggregateId;
use domain::Aggregate;
use tokio::sync::RwLock;

use crate::{RepositoryBackend, Result, StorageError, UnitOfWork, UnitOfWorkFactory};

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// In-memory aggregate storage.
///
/// Cloning shares the underlying map. Each unit of work stages its writes
/// privately and applies them under one write lock on commit. The counters
/// let tests assert whether a scope committed or rolled back.
pub struct InMemoryStorage<A> {
    aggregates: Arc<RwLock<BTreeMap<AggregateId, A>>>,
    counters: Arc<Counters>,
}

impl<A: Aggregate> InMemoryStorage<A> {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            aggregates: Arc::new(RwLock::new(BTreeMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Opens a storage session without wrapping it in a unit of work.
    pub fn session(&self) -> InMemoryBackend<A> {
        InMemoryBackend {
            aggregates: Arc::clone(&self.aggregates),
            counters: Arc::clone(&self.counters),
            staged: Vec::new(),
            finished: false,
        }
    }

    /// Writes an aggregate directly, bypassing any unit of work.
    pub async fn insert(&self, aggregate: A) {
        let stored = strip_events(aggregate);
        self.aggregates
            .write()
            .await
            .insert(stored.id().clone(), stored);
    }

    /// Returns the committed copy of an aggregate.
    pub async fn get(&self, id: &AggregateId) -> Option<A> {
        self.aggregates.read().await.get(id).cloned()
    }

    /// Returns the number of committed aggregates.
    pub async fn len(&self) -> usize {
        self.aggregates.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.aggregates.read().await.is_empty()
    }

    /// Number of units of work opened.
    pub fn begun(&self) -> usize {
        self.counters.begun.load(Ordering::SeqCst)
    }

    /// Number of sessions committed.
    pub fn commits(&self) -> usize {
        self.counters.commits.load(Ordering::SeqCst)
    }

    /// Number of sessions rolled back.
    pub fn rollbacks(&self) -> usize {
        self.counters.rollbacks.load(Ordering::SeqCst)
    }
}

impl<A: Aggregate> Default for InMemoryStorage<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for InMemoryStorage<A> {
    fn clone(&self) -> Self {
        Self {
            aggregates: Arc::clone(&self.aggregates),
            counters: Arc::clone(&self.counters),
        }
    }
}

#[async_trait]
impl<A: Aggregate> UnitOfWorkFactory for InMemoryStorage<A> {
    type Aggregate = A;
    type Backend = InMemoryBackend<A>;

    async fn begin(&self) -> Result<UnitOfWork<A, InMemoryBackend<A>>> {
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(UnitOfWork::new(self.session()))
    }
}

#[derive(Debug)]
enum Change<A> {
    Insert(A),
    Upsert(A),
    Remove(AggregateId),
}

/// One session over [`InMemoryStorage`].
pub struct InMemoryBackend<A> {
    aggregates: Arc<RwLock<BTreeMap<AggregateId, A>>>,
    counters: Arc<Counters>,
    staged: Vec<Change<A>>,
    finished: bool,
}

impl<A: Aggregate> InMemoryBackend<A> {
    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(StorageError::InvalidState("session already finished"));
        }
        Ok(())
    }

    /// Latest staged change for an ID, if any.
    fn staged(&self, id: &AggregateId) -> Option<Option<&A>> {
        self.staged.iter().rev().find_map(|change| match change {
            Change::Insert(aggregate) | Change::Upsert(aggregate) if aggregate.id() == id => {
                Some(Some(aggregate))
            }
            Change::Remove(removed) if removed == id => Some(None),
            _ => None,
        })
    }
}

#[async_trait]
impl<A: Aggregate> RepositoryBackend<A> for InMemoryBackend<A> {
    async fn insert(&mut self, aggregate: &A) -> Result<()> {
        self.ensure_open()?;
        if self.get(aggregate.id()).await?.is_some() {
            return Err(StorageError::Conflict(aggregate.id().clone()));
        }
        self.staged
            .push(Change::Insert(strip_events(aggregate.clone())));
        Ok(())
    }

    async fn add(&mut self, aggregate: &A) -> Result<()> {
        self.ensure_open()?;
        self.staged
            .push(Change::Upsert(strip_events(aggregate.clone())));
        Ok(())
    }

    async fn get(&mut self, id: &AggregateId) -> Result<Option<A>> {
        self.ensure_open()?;
        if let Some(staged) = self.staged(id) {
            return Ok(staged.cloned());
        }
        Ok(self.aggregates.read().await.get(id).cloned())
    }

    async fn delete(&mut self, id: &AggregateId) -> Result<()> {
        self.ensure_open()?;
        self.staged.push(Change::Remove(id.clone()));
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<A>> {
        self.ensure_open()?;
        let mut view = self.aggregates.read().await.clone();
        for change in &self.staged {
            apply(&mut view, change);
        }
        Ok(view.into_values().collect())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut aggregates = self.aggregates.write().await;

        // Another session may have committed the same ID since `insert`.
        let mut view = aggregates.clone();
        let mut conflict = None;
        for change in &self.staged {
            match change {
                Change::Insert(aggregate) if view.contains_key(aggregate.id()) => {
                    conflict = Some(aggregate.id().clone());
                    break;
                }
                _ => apply(&mut view, change),
            }
        }

        self.staged.clear();
        self.finished = true;
        if let Some(id) = conflict {
            self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::Conflict(id));
        }

        *aggregates = view;
        self.counters.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.staged.clear();
        self.finished = true;
        self.counters.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn apply<A: Aggregate>(aggregates: &mut BTreeMap<AggregateId, A>, change: &Change<A>) {
    match change {
        Change::Insert(aggregate) | Change::Upsert(aggregate) => {
            aggregates.insert(aggregate.id().clone(), aggregate.clone());
        }
        Change::Remove(id) => {
            aggregates.remove(id);
        }
    }
}

/// Stored copies never carry pending events.
fn strip_events<A: Aggregate>(mut aggregate: A) -> A {
    aggregate.take_events();
    aggregate
}
