//! Portfolio command handlers.

use async_trait::async_trait;
use common::AggregateId;
use domain::{
    CreatePortfolio, DeletePortfolio, DomainError, Portfolio, PortfolioAsset, PortfolioCommand,
    UpdatePortfolio,
};
use unit_of_work::{StorageError, UnitOfWork, UnitOfWorkFactory};

use crate::{CommandHandler, HandlerError, MessageBusBuilder};

/// Creates a portfolio. Fails with a conflict if the ID is taken.
pub struct CreatePortfolioHandler;

#[async_trait]
impl<F> CommandHandler<F> for CreatePortfolioHandler
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    type Command = CreatePortfolio;

    async fn handle(
        &self,
        command: CreatePortfolio,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError> {
        if uow.repository().get(&command.id).await?.is_some() {
            return Err(already_exists(&command.id).into());
        }

        // A concurrent create can still win between the check and the insert.
        let portfolio = Portfolio::from_command(&command)?;
        let lost_race = |e: StorageError| match e {
            StorageError::Conflict(_) => HandlerError::from(already_exists(&command.id)),
            e => e.into(),
        };
        uow.repository().insert(portfolio).await.map_err(lost_race)?;
        uow.commit().await.map_err(lost_race)?;
        Ok(())
    }
}

/// Replaces the name and assets of an existing portfolio.
pub struct UpdatePortfolioHandler;

#[async_trait]
impl<F> CommandHandler<F> for UpdatePortfolioHandler
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    type Command = UpdatePortfolio;

    async fn handle(
        &self,
        command: UpdatePortfolio,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError> {
        let mut portfolio = uow
            .repository()
            .get(&command.id)
            .await?
            .ok_or_else(|| not_found(&command.id))?;

        portfolio.update(
            command.name,
            PortfolioAsset::from_weights(&command.assets),
            command.correlation_id,
        )?;
        uow.repository().add(portfolio).await?;
        uow.commit().await?;
        Ok(())
    }
}

/// Deallocates and removes a portfolio.
pub struct DeletePortfolioHandler;

#[async_trait]
impl<F> CommandHandler<F> for DeletePortfolioHandler
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    type Command = DeletePortfolio;

    async fn handle(
        &self,
        command: DeletePortfolio,
        uow: &mut UnitOfWork<F::Aggregate, F::Backend>,
    ) -> Result<(), HandlerError> {
        let mut portfolio = uow
            .repository()
            .get(&command.id)
            .await?
            .ok_or_else(|| not_found(&command.id))?;

        portfolio.deallocate(command.correlation_id);
        uow.repository().delete(portfolio).await?;
        uow.commit().await?;
        Ok(())
    }
}

fn already_exists(id: &AggregateId) -> DomainError {
    DomainError::conflict(format!("Portfolio with ID {id} already exists."))
}

fn not_found(id: &AggregateId) -> DomainError {
    DomainError::not_found(format!("Portfolio with ID {id} not found."))
}

/// Starts a bus with every portfolio command handler registered.
pub fn portfolio_bus<F>(factory: F) -> MessageBusBuilder<F, PortfolioCommand>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    MessageBusBuilder::new(factory)
        .command_handler(CreatePortfolioHandler)
        .command_handler(UpdatePortfolioHandler)
        .command_handler(DeletePortfolioHandler)
}
