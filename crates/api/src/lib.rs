//! HTTP API server for the portfolio message bus.
//!
//! Provides REST endpoints for portfolio management, a server-sent events
//! endpoint per event topic, and an optional local command socket, with
//! structured logging (tracing) and Prometheus metrics.
//!
//! Events flow through two buses. The command bus handles requests and
//! publishes every committed event to the broker. The consumer bus receives
//! those events back from the broker and fans them out to streaming clients.
//! Keeping them apart means inbound events are never republished.

pub mod config;
pub mod daemon;
pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use broker::{
    Broker, EventConsumer, EventPublisher, InMemoryBroker, NatsBroker, PublishEventHandler,
    spawn_consumer,
};
use domain::{Portfolio, PortfolioCommand, PortfolioEvent, TopicRegistry};
use messagebus::{MessageBus, PortfolioBus, portfolio_bus};
use metrics_exporter_prometheus::PrometheusHandle;
use streams::{ClientStreams, StreamBroadcastHandler};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use unit_of_work::{InMemoryStorage, PostgresStorage, UnitOfWorkFactory};

use crate::config::Config;
use crate::error::StartupError;

/// Shared application state accessible from all handlers.
pub struct AppState<F: UnitOfWorkFactory> {
    /// Command bus. Publishes committed events to the broker.
    pub bus: PortfolioBus<F>,
    pub streams: Arc<ClientStreams>,
    /// Topics clients may stream.
    pub topics: TopicRegistry<PortfolioEvent>,
    pub heartbeat: Duration,
}

/// Everything [`create_services`] wires together.
pub struct Services<F: UnitOfWorkFactory> {
    pub state: Arc<AppState<F>>,
    /// Inbound side, ready to be spawned.
    pub consumer: EventConsumer<F, PortfolioCommand>,
}

/// Builds both buses, the client stream registry and the broker consumer.
pub fn create_services<F>(
    factory: F,
    broker: Arc<dyn Broker>,
    config: &Config,
) -> Result<Services<F>, StartupError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio> + Clone,
{
    let topics = PortfolioEvent::registry()?;
    let all_topics = topics.topics();

    let publisher = EventPublisher::new(Arc::clone(&broker), config.exchange.clone());
    let bus = portfolio_bus(factory.clone())
        .event_handler_for(
            &all_topics,
            Arc::new(PublishEventHandler::<PortfolioEvent>::new(publisher)),
        )
        .build()?;

    let streams = Arc::new(ClientStreams::with_capacity(config.stream_queue_capacity));
    let consumer_bus = MessageBus::<F, PortfolioCommand>::builder(factory)
        .event_handler_for(
            &all_topics,
            Arc::new(StreamBroadcastHandler::<PortfolioEvent>::new(Arc::clone(
                &streams,
            ))),
        )
        .build()?;

    let consumer = EventConsumer::new(
        broker,
        config.exchange.clone(),
        Arc::new(consumer_bus),
        topics.clone(),
    );

    let state = Arc::new(AppState {
        bus,
        streams,
        topics,
        heartbeat: config.sse_heartbeat,
    });

    Ok(Services { state, consumer })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<F>(state: Arc<AppState<F>>, metrics_handle: PrometheusHandle) -> Router
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/portfolios",
            get(routes::portfolios::list::<F>).post(routes::portfolios::create::<F>),
        )
        .route(
            "/portfolio/{id}",
            get(routes::portfolios::get::<F>)
                .put(routes::portfolios::update::<F>)
                .delete(routes::portfolios::delete::<F>),
        )
        .route("/events/{topic}", get(routes::events::stream::<F>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Connects the configured broker and storage, then serves until `shutdown`
/// resolves.
pub async fn run<S>(
    config: Config,
    metrics_handle: PrometheusHandle,
    shutdown: S,
) -> Result<(), StartupError>
where
    S: Future<Output = ()> + Send + 'static,
{
    let broker: Arc<dyn Broker> = match &config.nats_url {
        Some(url) => Arc::new(NatsBroker::connect(url).await?),
        None => {
            tracing::info!("NATS_URL not set, using in-process broker");
            Arc::new(InMemoryBroker::new())
        }
    };

    match &config.database_url {
        Some(url) => {
            let storage = PostgresStorage::connect(url).await?;
            storage.run_migrations().await?;
            tracing::info!("PostgreSQL storage ready");
            serve(storage, broker, &config, metrics_handle, shutdown).await
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory storage");
            let storage = InMemoryStorage::<Portfolio>::new();
            serve(storage, broker, &config, metrics_handle, shutdown).await
        }
    }
}

async fn serve<F, S>(
    factory: F,
    broker: Arc<dyn Broker>,
    config: &Config,
    metrics_handle: PrometheusHandle,
    shutdown: S,
) -> Result<(), StartupError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio> + Clone,
    S: Future<Output = ()> + Send + 'static,
{
    let Services { state, consumer } = create_services(factory, broker, config)?;

    // Detached: the consumer thread lives as long as the process and logs
    // its own startup failures.
    let _consumer = spawn_consumer(consumer)?;

    #[cfg(unix)]
    if let Some(path) = &config.daemon_socket {
        let listener = daemon::bind(path)?;
        tracing::info!(path = %path, "command socket listening");
        tokio::spawn(daemon::serve(listener, Arc::clone(&state)));
    }

    let app = create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
