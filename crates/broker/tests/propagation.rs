//! End-to-end propagation: command bus → broker → consumer bus.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use broker::{
    Broker, BrokerMessage, EventConsumer, EventPublisher, InMemoryBroker, NatsBroker,
    PublishEventHandler, spawn_consumer,
};
use bytes::Bytes;
use domain::{CreatePortfolio, DomainEvent, Portfolio, PortfolioEvent};
use messagebus::{EventHandler, HandlerError, PortfolioBus, portfolio_bus};
use unit_of_work::InMemoryStorage;

type Storage = InMemoryStorage<Portfolio>;

const EXCHANGE: &str = "events";

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

fn all_topics() -> [&'static str; 3] {
    [
        PortfolioEvent::CREATED,
        PortfolioEvent::UPDATED,
        PortfolioEvent::DELETED,
    ]
}

fn command_bus(broker: Arc<dyn Broker>) -> PortfolioBus<Storage> {
    let publisher = Arc::new(PublishEventHandler::<PortfolioEvent>::new(
        EventPublisher::new(broker, EXCHANGE),
    ));
    portfolio_bus(Storage::new())
        .event_handler_for(&all_topics(), publisher)
        .build()
        .unwrap()
}

fn consumer_bus(recorder: Arc<Recorder>) -> Arc<PortfolioBus<Storage>> {
    Arc::new(
        portfolio_bus(Storage::new())
            .event_handler_for(&all_topics(), recorder)
            .build()
            .unwrap(),
    )
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test]
async fn published_event_is_redispatched_with_same_correlation_id() {
    let broker = InMemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        consumer_bus(recorder.clone()),
        PortfolioEvent::registry().unwrap(),
    );
    tokio::spawn(consumer.run());
    wait_for(|| broker.subscription_count(EXCHANGE) == 1).await;

    let bus = command_bus(Arc::new(broker.clone()));
    let command =
        CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)]).with_correlation_id("corr-7");
    bus.execute(command).await.unwrap();

    wait_for(|| recorder.events().len() == 1).await;
    let events = recorder.events();
    assert_eq!(events[0].topic(), PortfolioEvent::CREATED);
    assert_eq!(events[0].id().as_str(), "p1");
    assert_eq!(events[0].correlation_id().as_str(), "corr-7");
}

#[tokio::test]
async fn consumer_on_its_own_thread_receives_events() {
    let broker = InMemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        consumer_bus(recorder.clone()),
        PortfolioEvent::registry().unwrap(),
    );
    let _handle = spawn_consumer(consumer).unwrap();
    wait_for(|| broker.subscription_count(EXCHANGE) == 1).await;

    let bus = command_bus(Arc::new(broker.clone()));
    bus.execute(CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)]))
        .await
        .unwrap();

    wait_for(|| recorder.events().len() == 1).await;
}

#[tokio::test]
async fn undecodable_message_is_dropped_and_consumer_continues() {
    let broker = InMemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        consumer_bus(recorder.clone()),
        PortfolioEvent::registry().unwrap(),
    );

    consumer
        .process(BrokerMessage {
            topic: PortfolioEvent::CREATED.to_string(),
            body: Bytes::from_static(b"not json"),
        })
        .await;
    consumer
        .process(BrokerMessage {
            topic: "events.unknown".to_string(),
            body: Bytes::from_static(br#"{"id": "p1", "correlation_id": "c1"}"#),
        })
        .await;
    consumer
        .process(BrokerMessage {
            topic: PortfolioEvent::DELETED.to_string(),
            body: Bytes::from_static(br#"{"id": "p1", "correlation_id": "c1"}"#),
        })
        .await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], PortfolioEvent::Deleted(_)));
}

#[tokio::test]
async fn consumer_without_handlers_returns_immediately() {
    let broker = InMemoryBroker::new();
    let bus = Arc::new(portfolio_bus(Storage::new()).build().unwrap());
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        bus,
        PortfolioEvent::registry().unwrap(),
    );

    consumer.run().await.unwrap();

    assert_eq!(broker.subscription_count(EXCHANGE), 0);
}

#[tokio::test]
async fn consumer_binds_only_subscribed_topics() {
    let broker = InMemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let bus = Arc::new(
        portfolio_bus(Storage::new())
            .event_handler(PortfolioEvent::DELETED, recorder.clone())
            .build()
            .unwrap(),
    );
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        bus,
        PortfolioEvent::registry().unwrap(),
    );
    tokio::spawn(consumer.run());
    wait_for(|| broker.subscription_count(EXCHANGE) == 1).await;

    let body = Bytes::from_static(br#"{"id": "p1", "correlation_id": "c1"}"#);
    broker
        .publish(EXCHANGE, PortfolioEvent::CREATED, body.clone())
        .await
        .unwrap();
    broker
        .publish(EXCHANGE, PortfolioEvent::DELETED, body)
        .await
        .unwrap();

    wait_for(|| recorder.events().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.events().len(), 1);
    assert!(matches!(recorder.events()[0], PortfolioEvent::Deleted(_)));
}

/// Accepts the exchange but refuses every subscription.
struct RefusesSubscriptions;

#[async_trait]
impl Broker for RefusesSubscriptions {
    async fn declare_exchange(&self, _exchange: &str) -> broker::Result<()> {
        Ok(())
    }

    async fn publish(&self, _: &str, _: &str, _: Bytes) -> broker::Result<()> {
        Ok(())
    }

    async fn subscribe(&self, _: &str, _: &[&str]) -> broker::Result<broker::MessageStream> {
        Err(broker::BrokerError::Subscribe("refused".to_string()))
    }
}

fn refused_consumer() -> EventConsumer<Storage, domain::PortfolioCommand> {
    EventConsumer::new(
        Arc::new(RefusesSubscriptions),
        EXCHANGE,
        consumer_bus(Arc::new(Recorder::default())),
        PortfolioEvent::registry().unwrap(),
    )
}

#[tokio::test]
async fn refused_subscription_stops_the_consumer_with_an_error() {
    let result = refused_consumer().run().await;

    assert!(matches!(result, Err(broker::BrokerError::Subscribe(msg)) if msg == "refused"));
}

#[test]
fn refused_subscription_ends_the_consumer_thread() {
    let handle = spawn_consumer(refused_consumer()).unwrap();

    let result = handle.join().unwrap();

    assert!(matches!(result, Err(broker::BrokerError::Subscribe(_))));
}

#[tokio::test]
async fn broker_outage_does_not_fail_the_command() {
    struct Unreachable;

    #[async_trait]
    impl Broker for Unreachable {
        async fn declare_exchange(&self, _exchange: &str) -> broker::Result<()> {
            Err(broker::BrokerError::Connection("refused".to_string()))
        }

        async fn publish(&self, _: &str, _: &str, _: Bytes) -> broker::Result<()> {
            Err(broker::BrokerError::Connection("refused".to_string()))
        }

        async fn subscribe(&self, _: &str, _: &[&str]) -> broker::Result<broker::MessageStream> {
            Err(broker::BrokerError::Connection("refused".to_string()))
        }
    }

    let bus = command_bus(Arc::new(Unreachable));

    let result = bus
        .execute(CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)]))
        .await;

    assert!(result.is_ok());
}

/// Needs a NATS server: `NATS_URL=nats://localhost:4222 cargo test -- --ignored`
#[tokio::test]
#[ignore = "requires a running NATS server"]
async fn nats_round_trip() {
    let url = std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let broker = NatsBroker::connect(&url).await.unwrap();
    let recorder = Arc::new(Recorder::default());
    let consumer = EventConsumer::new(
        Arc::new(broker.clone()),
        EXCHANGE,
        consumer_bus(recorder.clone()),
        PortfolioEvent::registry().unwrap(),
    );
    tokio::spawn(consumer.run());
    tokio::time::sleep(Duration::from_millis(200)).await;

    let bus = command_bus(Arc::new(broker));
    bus.execute(CreatePortfolio::new("nats-1", "Growth", [("AAPL", 1.0)]))
        .await
        .unwrap();

    wait_for(|| recorder.events().len() == 1).await;
    assert_eq!(recorder.events()[0].id().as_str(), "nats-1");
}
