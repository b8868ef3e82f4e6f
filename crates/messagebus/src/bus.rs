//! The message bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use domain::{Aggregate, Command, DomainEvent, PortfolioCommand};
use unit_of_work::UnitOfWorkFactory;

use crate::handler::{DynCommandHandler, Typed};
use crate::{BusError, CommandHandler, EventHandler, HandlerError};

/// Event type produced by the aggregates behind a unit-of-work factory.
pub type EventOf<F> = <<F as UnitOfWorkFactory>::Aggregate as Aggregate>::Event;

/// Anything the bus can handle.
#[derive(Debug, Clone)]
pub enum Message<C, E> {
    Command(C),
    Event(E),
}

/// Bus over portfolio storage and commands.
pub type PortfolioBus<F> = MessageBus<F, PortfolioCommand>;

/// Routes commands to exactly one handler and events to any number of them.
///
/// `handle` runs a FIFO work queue seeded with one message. Commands fail
/// fast: the first handler error stops the queue and is returned. Events are
/// best-effort: every registered handler runs, failures are logged, and the
/// queue keeps draining.
///
/// The bus holds no per-call state, so one instance can serve many
/// concurrent callers; each command gets its own unit of work.
pub struct MessageBus<F: UnitOfWorkFactory, C> {
    factory: F,
    command_handlers: HashMap<&'static str, Box<dyn DynCommandHandler<F, C>>>,
    event_handlers: HashMap<&'static str, Vec<Arc<dyn EventHandler<EventOf<F>>>>>,
}

impl<F, C> MessageBus<F, C>
where
    F: UnitOfWorkFactory,
    C: Command,
{
    pub fn builder(factory: F) -> MessageBusBuilder<F, C> {
        MessageBusBuilder::new(factory)
    }

    /// Returns the unit-of-work factory, for read-only queries.
    pub fn uow_factory(&self) -> &F {
        &self.factory
    }

    /// Returns every topic that has at least one event handler, sorted.
    pub fn subscribed_topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<_> = self
            .event_handlers
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(topic, _)| *topic)
            .collect();
        topics.sort_unstable();
        topics
    }

    /// Returns true if a handler is registered for the named command.
    pub fn handles_command(&self, name: &str) -> bool {
        self.command_handlers.contains_key(name)
    }

    /// Handles a message and everything it causes.
    pub async fn handle(&self, message: Message<C, EventOf<F>>) -> Result<(), BusError> {
        let mut queue = VecDeque::from([message]);

        while let Some(message) = queue.pop_front() {
            match message {
                Message::Command(command) => {
                    let events = self.handle_command(command).await?;
                    queue.extend(events.into_iter().map(Message::Event));
                }
                Message::Event(event) => self.handle_event(&event).await,
            }
        }

        Ok(())
    }

    /// Handles a command and the events it produces.
    pub async fn execute(&self, command: impl Into<C>) -> Result<(), BusError> {
        self.handle(Message::Command(command.into())).await
    }

    /// Handles an event that originated elsewhere.
    pub async fn notify(&self, event: EventOf<F>) -> Result<(), BusError> {
        self.handle(Message::Event(event)).await
    }

    #[tracing::instrument(
        skip_all,
        fields(command = command.name(), correlation_id = %command.correlation_id())
    )]
    async fn handle_command(&self, command: C) -> Result<Vec<EventOf<F>>, BusError> {
        let name = command.name();
        let Some(handler) = self.command_handlers.get(name) else {
            metrics::counter!("messagebus_commands_failed_total", "command" => name).increment(1);
            tracing::error!("no handler registered for command");
            return Err(BusError::UnknownCommand(name));
        };

        let mut uow = self.factory.begin().await?;
        let result = handler.dispatch(command, &mut uow).await;
        let closed = uow.close().await;

        if let Err(e) = result {
            if let Err(close_error) = &closed {
                tracing::warn!(error = %close_error, "rollback after failed command failed");
            }
            metrics::counter!("messagebus_commands_failed_total", "command" => name).increment(1);
            if e.is_application() {
                tracing::info!(error = %e, "command rejected");
            } else {
                tracing::warn!(error = ?e, "command failed");
            }
            return Err(e.into());
        }
        closed?;

        let events = uow.collect_new_events();
        metrics::counter!("messagebus_commands_handled_total", "command" => name).increment(1);
        tracing::debug!(events = events.len(), "command handled");
        Ok(events)
    }

    #[tracing::instrument(
        skip_all,
        fields(topic = event.topic(), correlation_id = %event.correlation_id())
    )]
    async fn handle_event(&self, event: &EventOf<F>) {
        let topic = event.topic();
        let handlers = self
            .event_handlers
            .get(topic)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for handler in handlers {
            match handler.handle(event).await {
                Ok(()) => {}
                Err(e) => log_event_handler_failure(topic, handler.name(), &e),
            }
        }

        metrics::counter!("messagebus_events_handled_total", "topic" => topic).increment(1);
        tracing::debug!(handlers = handlers.len(), "event handled");
    }
}

fn log_event_handler_failure(topic: &'static str, handler: &'static str, error: &HandlerError) {
    metrics::counter!(
        "messagebus_event_handler_failures_total",
        "topic" => topic,
        "handler" => handler
    )
    .increment(1);

    if error.is_application() {
        tracing::warn!(handler, error = %error, "event handler rejected event");
    } else {
        tracing::error!(handler, error = ?error, "event handler failed");
    }
}

/// Collects handlers into a [`MessageBus`].
///
/// The routing table is fixed once `build` returns.
pub struct MessageBusBuilder<F: UnitOfWorkFactory, C> {
    factory: F,
    command_handlers: HashMap<&'static str, Box<dyn DynCommandHandler<F, C>>>,
    event_handlers: HashMap<&'static str, Vec<Arc<dyn EventHandler<EventOf<F>>>>>,
    duplicate: Option<&'static str>,
}

impl<F, C> MessageBusBuilder<F, C>
where
    F: UnitOfWorkFactory,
    C: Command,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            command_handlers: HashMap::new(),
            event_handlers: HashMap::new(),
            duplicate: None,
        }
    }

    /// Registers the one handler for `H::Command`.
    pub fn command_handler<H>(mut self, handler: H) -> Self
    where
        H: CommandHandler<F>,
        H::Command: TryFrom<C, Error = C>,
    {
        let name = <H::Command as domain::NamedCommand>::NAME;
        if self
            .command_handlers
            .insert(name, Box::new(Typed(handler)))
            .is_some()
        {
            self.duplicate.get_or_insert(name);
        }
        self
    }

    /// Appends a handler for one topic. Handlers run in registration order.
    pub fn event_handler(
        mut self,
        topic: &'static str,
        handler: Arc<dyn EventHandler<EventOf<F>>>,
    ) -> Self {
        self.event_handlers.entry(topic).or_default().push(handler);
        self
    }

    /// Appends the same handler for several topics.
    pub fn event_handler_for(
        self,
        topics: &[&'static str],
        handler: Arc<dyn EventHandler<EventOf<F>>>,
    ) -> Self {
        topics.iter().fold(self, |builder, topic| {
            builder.event_handler(*topic, Arc::clone(&handler))
        })
    }

    /// Finishes the routing table, failing if a command has two handlers.
    pub fn build(self) -> Result<MessageBus<F, C>, BusError> {
        if let Some(name) = self.duplicate {
            return Err(BusError::DuplicateCommandHandler(name));
        }
        Ok(MessageBus {
            factory: self.factory,
            command_handlers: self.command_handlers,
            event_handlers: self.event_handlers,
        })
    }
}
