//! Committed events reach live client streams.

use std::sync::Arc;
use std::time::Duration;

use domain::{CreatePortfolio, DeletePortfolio, Portfolio, PortfolioEvent};
use messagebus::{PortfolioBus, portfolio_bus};
use streams::{ClientStreams, Frame, StreamBroadcastHandler};
use unit_of_work::InMemoryStorage;

type Storage = InMemoryStorage<Portfolio>;

fn bus(streams: Arc<ClientStreams>) -> PortfolioBus<Storage> {
    portfolio_bus(Storage::new())
        .event_handler_for(
            &[
                PortfolioEvent::CREATED,
                PortfolioEvent::UPDATED,
                PortfolioEvent::DELETED,
            ],
            Arc::new(StreamBroadcastHandler::<PortfolioEvent>::new(streams)),
        )
        .build()
        .unwrap()
}

fn json(frame: Frame) -> serde_json::Value {
    match frame {
        Frame::Payload(payload) => serde_json::from_str(&payload).unwrap(),
        Frame::Heartbeat => panic!("expected a payload, got a heartbeat"),
    }
}

#[tokio::test]
async fn subscriber_receives_event_body_for_its_topic() {
    let streams = Arc::new(ClientStreams::new());
    let mut created = streams.subscribe(PortfolioEvent::CREATED);
    let mut deleted = streams.subscribe(PortfolioEvent::DELETED);
    let bus = bus(streams.clone());

    bus.execute(CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)]).with_correlation_id("c1"))
        .await
        .unwrap();

    let frame = created.next_frame(Duration::from_secs(1)).await;
    assert_eq!(
        json(frame),
        serde_json::json!({"id": "p1", "correlation_id": "c1"})
    );
    assert_eq!(
        deleted.next_frame(Duration::from_millis(20)).await,
        Frame::Heartbeat
    );
}

#[tokio::test]
async fn slow_subscriber_does_not_block_commands() {
    let streams = Arc::new(ClientStreams::with_capacity(1));
    let mut slow = streams.subscribe(PortfolioEvent::CREATED);
    let bus = bus(streams.clone());

    for id in ["p1", "p2", "p3"] {
        bus.execute(CreatePortfolio::new(id, "Growth", [("AAPL", 1.0)]))
            .await
            .unwrap();
    }

    assert_eq!(json(slow.next_frame(Duration::from_secs(1)).await)["id"], "p1");
    assert_eq!(
        slow.next_frame(Duration::from_millis(20)).await,
        Frame::Heartbeat
    );
}

#[tokio::test]
async fn events_without_subscribers_are_discarded() {
    let streams = Arc::new(ClientStreams::new());
    let bus = bus(streams.clone());

    bus.execute(CreatePortfolio::new("p1", "Growth", [("AAPL", 1.0)]))
        .await
        .unwrap();
    bus.execute(DeletePortfolio::new("p1")).await.unwrap();

    assert_eq!(streams.topic_count(), 0);
}
