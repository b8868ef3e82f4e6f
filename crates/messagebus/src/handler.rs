//! Handler traits.

use async_trait::async_trait;
use domain::{DomainEvent, NamedCommand};
use unit_of_work::{UnitOfWork, UnitOfWorkFactory};

use crate::HandlerError;

/// Handles one concrete command type inside a unit of work.
///
/// The bus opens a fresh unit of work for every command and closes it once
/// the handler returns. Handlers must call `uow.commit()` themselves; a
/// handler that returns without committing leaves no trace.
#[async_trait]
pub trait CommandHandler<F: UnitOfWorkFactory>: Send + Sync + 'static {
    /// The command this handler accepts.
    type Command: NamedCommand + Send + 'static;

    async fn handle(
        &self,
        command: Self::Command,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError>;
}

/// Reacts to an event that has already been committed.
///
/// Failures are logged by the bus and never reach the command caller.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync {
    /// Returns the name of this handler, used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &E) -> Result<(), HandlerError>;
}

/// Type-erased command handler keyed by command name.
#[async_trait]
pub(crate) trait DynCommandHandler<F: UnitOfWorkFactory, C>: Send + Sync {
    async fn dispatch(
        &self,
        command: C,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError>;
}

pub(crate) struct Typed<H>(pub(crate) H);

#[async_trait]
impl<F, C, H> DynCommandHandler<F, C> for Typed<H>
where
    F: UnitOfWorkFactory,
    C: Send + 'static,
    H: CommandHandler<F>,
    H::Command: TryFrom<C, Error = C>,
{
    async fn dispatch(
        &self,
        command: C,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError> {
        let command = H::Command::try_from(command).map_err(|_| {
            HandlerError::internal(format!(
                "command routed to the handler for {}",
                H::Command::NAME
            ))
        })?;
        self.0.handle(command, uow).await
    }
}
