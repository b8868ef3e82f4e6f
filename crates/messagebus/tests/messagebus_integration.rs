//! Integration tests for command and event dispatch.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    Aggregate, CreatePortfolio, DeletePortfolio, DomainError, DomainEvent, Portfolio,
    PortfolioCommand, PortfolioCreated, PortfolioEvent, UpdatePortfolio,
};
use messagebus::{
    BusError, ErrorKind, EventHandler, HandlerError, Message, MessageBus, PortfolioBus,
    portfolio_bus,
};
use unit_of_work::{
    InMemoryBackend, InMemoryStorage, RepositoryBackend, StorageError, UnitOfWork,
    UnitOfWorkFactory,
};

type Storage = InMemoryStorage<Portfolio>;

/// Records every event it sees.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<PortfolioEvent>>,
}

impl Recorder {
    fn events(&self) -> Vec<PortfolioEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler<PortfolioEvent> for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn handle(&self, event: &PortfolioEvent) -> Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Always fails, either with a known or an unexpected error.
struct Failing {
    application: bool,
}

#[async_trait]
impl EventHandler<PortfolioEvent> for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn handle(&self, _event: &PortfolioEvent) -> Result<(), HandlerError> {
        if self.application {
            Err(DomainError::validation("rejected").into())
        } else {
            Err(HandlerError::internal("connection refused"))
        }
    }
}

fn bus_with(storage: &Storage, recorder: Arc<Recorder>) -> PortfolioBus<Storage> {
    portfolio_bus(storage.clone())
        .event_handler_for(
            &[
                PortfolioEvent::CREATED,
                PortfolioEvent::UPDATED,
                PortfolioEvent::DELETED,
            ],
            recorder,
        )
        .build()
        .unwrap()
}

fn create_p1() -> CreatePortfolio {
    CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)])
}

mod commands {
    use super::*;

    #[tokio::test]
    async fn unknown_command_never_opens_a_unit_of_work() {
        let storage = Storage::new();
        let bus: PortfolioBus<Storage> = MessageBus::builder(storage.clone()).build().unwrap();

        let result = bus.execute(create_p1()).await;

        assert!(matches!(result, Err(BusError::UnknownCommand("CreatePortfolio"))));
        assert_eq!(storage.begun(), 0);
        assert_eq!(storage.commits(), 0);
    }

    #[tokio::test]
    async fn create_commits_once_and_stores_portfolio() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&storage, recorder.clone());

        bus.execute(create_p1()).await.unwrap();

        assert_eq!(storage.commits(), 1);
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id().as_str(), "p1");

        let stored = storage.get(&AggregateId::from("p1")).await.unwrap();
        assert_eq!(stored.assets().len(), 1);
        assert_eq!(stored.assets()[0].symbol, "AAPL");
        assert_eq!(stored.assets()[0].weight, 1.0);
    }

    #[tokio::test]
    async fn duplicate_create_is_a_conflict() {
        let storage = Storage::new();
        let bus = bus_with(&storage, Arc::new(Recorder::default()));

        bus.execute(create_p1()).await.unwrap();
        let result = bus.execute(create_p1()).await;

        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(storage.len().await, 1);
        assert_eq!(storage.commits(), 1);
    }

    #[tokio::test]
    async fn delete_missing_is_not_found_and_never_commits() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&storage, recorder.clone());

        let result = bus.execute(DeletePortfolio::new("missing")).await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(storage.commits(), 0);
        assert_eq!(storage.rollbacks(), 1);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let storage = Storage::new();
        let bus = bus_with(&storage, Arc::new(Recorder::default()));

        let result = bus
            .execute(UpdatePortfolio::new("missing", "Income", [("T", 1.0)]))
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalid_create_is_a_validation_error() {
        let storage = Storage::new();
        let bus = bus_with(&storage, Arc::new(Recorder::default()));

        let result = bus
            .execute(CreatePortfolio::new("p1", "Growth", [("AAPL", -1.0)]))
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::Validation);
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn full_lifecycle_emits_events_in_order() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&storage, recorder.clone());

        bus.execute(create_p1()).await.unwrap();
        bus.execute(UpdatePortfolio::new("p1", "Income", [("T", 0.5), ("VZ", 0.5)]))
            .await
            .unwrap();
        bus.execute(DeletePortfolio::new("p1")).await.unwrap();

        let topics: Vec<_> = recorder.events().iter().map(|e| e.topic()).collect();
        assert_eq!(
            topics,
            vec![
                PortfolioEvent::CREATED,
                PortfolioEvent::UPDATED,
                PortfolioEvent::DELETED
            ]
        );
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn stored_version_advances_on_update() {
        let storage = Storage::new();
        let bus = bus_with(&storage, Arc::new(Recorder::default()));

        bus.execute(create_p1()).await.unwrap();
        bus.execute(UpdatePortfolio::new("p1", "Income", [("T", 1.0)]))
            .await
            .unwrap();

        let stored = storage.get(&AggregateId::from("p1")).await.unwrap();
        assert_eq!(stored.version_number(), 1);
        assert_eq!(stored.name(), "Income");
    }

    #[tokio::test]
    async fn duplicate_command_handler_fails_to_build() {
        let result = portfolio_bus(Storage::new())
            .command_handler(messagebus::CreatePortfolioHandler)
            .build();

        assert!(matches!(
            result,
            Err(BusError::DuplicateCommandHandler("CreatePortfolio"))
        ));
    }
}

mod events {
    use super::*;

    #[tokio::test]
    async fn correlation_id_flows_from_command_to_event() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&storage, recorder.clone());

        let command = create_p1().with_correlation_id("corr-42");
        bus.handle(Message::Command(PortfolioCommand::from(command)))
            .await
            .unwrap();

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id().as_str(), "corr-42");
    }

    #[tokio::test]
    async fn failing_handlers_do_not_stop_the_others() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = portfolio_bus(storage.clone())
            .event_handler(
                PortfolioEvent::CREATED,
                Arc::new(Failing { application: true }),
            )
            .event_handler(
                PortfolioEvent::CREATED,
                Arc::new(Failing { application: false }),
            )
            .event_handler(PortfolioEvent::CREATED, recorder.clone())
            .build()
            .unwrap();

        let result = bus.execute(create_p1()).await;

        assert!(result.is_ok());
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(storage.commits(), 1);
    }

    #[tokio::test]
    async fn event_without_handlers_is_a_no_op() {
        let storage = Storage::new();
        let bus = portfolio_bus(storage.clone()).build().unwrap();

        let event = PortfolioEvent::Created(PortfolioCreated {
            id: AggregateId::from("p1"),
            correlation_id: "c1".into(),
        });

        assert!(bus.notify(event).await.is_ok());
        assert_eq!(storage.begun(), 0);
    }

    #[tokio::test]
    async fn external_events_reach_handlers_without_a_unit_of_work() {
        let storage = Storage::new();
        let recorder = Arc::new(Recorder::default());
        let bus = bus_with(&storage, recorder.clone());

        let event = PortfolioEvent::Created(PortfolioCreated {
            id: AggregateId::from("remote"),
            correlation_id: "c9".into(),
        });
        bus.notify(event.clone()).await.unwrap();

        assert_eq!(recorder.events(), vec![event]);
        assert_eq!(storage.begun(), 0);
    }

    #[tokio::test]
    async fn subscribed_topics_lists_topics_with_handlers() {
        let storage = Storage::new();
        let bus = portfolio_bus(storage)
            .event_handler(PortfolioEvent::DELETED, Arc::new(Recorder::default()))
            .event_handler(PortfolioEvent::CREATED, Arc::new(Recorder::default()))
            .build()
            .unwrap();

        assert_eq!(
            bus.subscribed_topics(),
            vec![PortfolioEvent::CREATED, PortfolioEvent::DELETED]
        );
    }

    #[tokio::test]
    async fn commands_are_registered_by_name() {
        let bus = portfolio_bus(Storage::new()).build().unwrap();

        assert!(bus.handles_command("CreatePortfolio"));
        assert!(bus.handles_command("UpdatePortfolio"));
        assert!(bus.handles_command("DeletePortfolio"));
        assert!(!bus.handles_command("RebalancePortfolio"));
    }
}

/// In-memory storage with switchable faults.
#[derive(Clone, Default)]
struct Faulty {
    storage: Storage,
    /// Reads never see committed aggregates, as if another scope had not
    /// committed yet when this one checked.
    stale_reads: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

struct FaultyBackend {
    inner: InMemoryBackend<Portfolio>,
    faults: Faulty,
}

#[async_trait]
impl RepositoryBackend<Portfolio> for FaultyBackend {
    async fn insert(&mut self, aggregate: &Portfolio) -> unit_of_work::Result<()> {
        self.inner.insert(aggregate).await
    }

    async fn add(&mut self, aggregate: &Portfolio) -> unit_of_work::Result<()> {
        self.inner.add(aggregate).await
    }

    async fn get(&mut self, id: &AggregateId) -> unit_of_work::Result<Option<Portfolio>> {
        if self.faults.stale_reads {
            return Ok(None);
        }
        self.inner.get(id).await
    }

    async fn delete(&mut self, id: &AggregateId) -> unit_of_work::Result<()> {
        self.inner.delete(id).await
    }

    async fn list(&mut self) -> unit_of_work::Result<Vec<Portfolio>> {
        self.inner.list().await
    }

    async fn commit(&mut self) -> unit_of_work::Result<()> {
        if self.faults.fail_commit {
            self.inner.rollback().await?;
            return Err(StorageError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> unit_of_work::Result<()> {
        self.inner.rollback().await?;
        if self.faults.fail_rollback {
            return Err(StorageError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWorkFactory for Faulty {
    type Aggregate = Portfolio;
    type Backend = FaultyBackend;

    async fn begin(&self) -> unit_of_work::Result<UnitOfWork<Portfolio, FaultyBackend>> {
        Ok(UnitOfWork::new(FaultyBackend {
            inner: self.storage.session(),
            faults: self.clone(),
        }))
    }
}

fn faulty_bus(faults: Faulty, recorder: Arc<Recorder>) -> PortfolioBus<Faulty> {
    portfolio_bus(faults)
        .event_handler(PortfolioEvent::CREATED, recorder)
        .build()
        .unwrap()
}

mod storage_failures {
    use super::*;

    #[tokio::test]
    async fn failed_commit_is_internal_and_emits_nothing() {
        let faults = Faulty {
            fail_commit: true,
            ..Faulty::default()
        };
        let recorder = Arc::new(Recorder::default());
        let bus = faulty_bus(faults.clone(), recorder.clone());

        let error = bus.execute(create_p1()).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Internal);
        assert!(matches!(
            error,
            BusError::Handler(HandlerError::Storage(StorageError::Database(_)))
        ));
        assert!(recorder.events().is_empty());
        assert!(faults.storage.is_empty().await);
        assert_eq!(faults.storage.commits(), 0);
    }

    #[tokio::test]
    async fn create_that_loses_a_race_is_a_conflict() {
        let faults = Faulty {
            stale_reads: true,
            ..Faulty::default()
        };
        faults
            .storage
            .insert(Portfolio::from_command(&create_p1()).unwrap())
            .await;
        let recorder = Arc::new(Recorder::default());
        let bus = faulty_bus(faults.clone(), recorder.clone());

        let error = bus.execute(create_p1()).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Conflict);
        assert_eq!(error.to_string(), "Portfolio with ID p1 already exists.");
        assert!(recorder.events().is_empty());
        assert_eq!(faults.storage.len().await, 1);
        assert_eq!(faults.storage.commits(), 0);
    }

    #[tokio::test]
    async fn failed_rollback_does_not_mask_the_command_error() {
        let faults = Faulty {
            fail_rollback: true,
            ..Faulty::default()
        };
        let bus = faulty_bus(faults.clone(), Arc::new(Recorder::default()));

        let error = bus.execute(DeletePortfolio::new("missing")).await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(faults.storage.rollbacks(), 1);
    }
}

#[tokio::test]
async fn concurrent_commands_on_different_aggregates() {
    let storage = Storage::new();
    let recorder = Arc::new(Recorder::default());
    let bus = Arc::new(bus_with(&storage, recorder.clone()));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let bus = Arc::clone(&bus);
            tokio::spawn(async move {
                bus.execute(CreatePortfolio::new(format!("p{i}"), "Growth", [("AAPL", 1.0)]))
                    .await
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(storage.len().await, 10);
    assert_eq!(recorder.events().len(), 10);
    assert_eq!(storage.commits(), 10);
}
