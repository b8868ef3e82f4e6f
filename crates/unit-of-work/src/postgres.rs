use std::collections::BTreeMap;

use async_trait::async_trait;
use common::AggregateId;
use domain::{Aggregate, Portfolio, PortfolioAsset};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{RepositoryBackend, Result, StorageError, UnitOfWork, UnitOfWorkFactory};

/// PostgreSQL-backed portfolio storage.
///
/// Every unit of work runs inside its own database transaction.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Creates a new PostgreSQL storage.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(url).await?))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWorkFactory for PostgresStorage {
    type Aggregate = Portfolio;
    type Backend = PostgresBackend;

    async fn begin(&self) -> Result<UnitOfWork<Portfolio, PostgresBackend>> {
        let tx = self.pool.begin().await?;
        Ok(UnitOfWork::new(PostgresBackend { tx: Some(tx) }))
    }
}

/// One database transaction. Dropping it unfinished rolls it back.
pub struct PostgresBackend {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresBackend {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>> {
        self.tx
            .as_mut()
            .ok_or(StorageError::InvalidState("transaction already finished"))
    }

    fn take_tx(&mut self) -> Result<Transaction<'static, Postgres>> {
        self.tx
            .take()
            .ok_or(StorageError::InvalidState("transaction already finished"))
    }
}

#[async_trait]
impl RepositoryBackend<Portfolio> for PostgresBackend {
    async fn insert(&mut self, portfolio: &Portfolio) -> Result<()> {
        let tx = self.tx()?;

        // Blocks behind a concurrent uncommitted insert of the same ID, then
        // fails with a unique violation once that one commits.
        sqlx::query("INSERT INTO portfolios (id, name, version_number) VALUES ($1, $2, $3)")
            .bind(portfolio.id().as_str())
            .bind(portfolio.name())
            .bind(version_to_db(portfolio.version_number())?)
            .execute(&mut **tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    StorageError::Conflict(portfolio.id().clone())
                }
                e => e.into(),
            })?;

        replace_assets(tx, portfolio).await
    }

    async fn add(&mut self, portfolio: &Portfolio) -> Result<()> {
        let tx = self.tx()?;

        sqlx::query(
            r#"
            INSERT INTO portfolios (id, name, version_number)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, version_number = EXCLUDED.version_number
            "#,
        )
        .bind(portfolio.id().as_str())
        .bind(portfolio.name())
        .bind(version_to_db(portfolio.version_number())?)
        .execute(&mut **tx)
        .await?;

        replace_assets(tx, portfolio).await
    }

    async fn get(&mut self, id: &AggregateId) -> Result<Option<Portfolio>> {
        let tx = self.tx()?;

        let Some(row) =
            sqlx::query("SELECT id, name, version_number FROM portfolios WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&mut **tx)
                .await?
        else {
            return Ok(None);
        };

        let asset_rows = sqlx::query(
            r#"
            SELECT portfolio_id, symbol, weight
            FROM portfolio_assets
            WHERE portfolio_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&mut **tx)
        .await?;

        let assets = asset_rows
            .iter()
            .map(row_to_asset)
            .collect::<Result<Vec<_>>>()?;
        row_to_portfolio(&row, assets).map(Some)
    }

    async fn delete(&mut self, id: &AggregateId) -> Result<()> {
        let tx = self.tx()?;
        // portfolio_assets rows go with it via ON DELETE CASCADE
        sqlx::query("DELETE FROM portfolios WHERE id = $1")
            .bind(id.as_str())
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn list(&mut self) -> Result<Vec<Portfolio>> {
        let tx = self.tx()?;

        let rows = sqlx::query("SELECT id, name, version_number FROM portfolios ORDER BY id ASC")
            .fetch_all(&mut **tx)
            .await?;

        let asset_rows = sqlx::query(
            r#"
            SELECT portfolio_id, symbol, weight
            FROM portfolio_assets
            ORDER BY portfolio_id ASC, position ASC
            "#,
        )
        .fetch_all(&mut **tx)
        .await?;

        let mut assets: BTreeMap<String, Vec<PortfolioAsset>> = BTreeMap::new();
        for row in &asset_rows {
            let portfolio_id: String = row.try_get("portfolio_id")?;
            assets
                .entry(portfolio_id)
                .or_default()
                .push(row_to_asset(row)?);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                row_to_portfolio(row, assets.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn commit(&mut self) -> Result<()> {
        self.take_tx()?.commit().await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.take_tx()?.rollback().await?;
        Ok(())
    }
}

async fn replace_assets(tx: &mut Transaction<'static, Postgres>, portfolio: &Portfolio) -> Result<()> {
    let id = portfolio.id().as_str();

    sqlx::query("DELETE FROM portfolio_assets WHERE portfolio_id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    for (position, asset) in portfolio.assets().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO portfolio_assets (portfolio_id, position, symbol, weight)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(position as i32)
        .bind(&asset.symbol)
        .bind(asset.weight)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

fn row_to_portfolio(row: &PgRow, assets: Vec<PortfolioAsset>) -> Result<Portfolio> {
    let id: String = row.try_get("id")?;
    let version: i64 = row.try_get("version_number")?;
    let version_number = u64::try_from(version).map_err(|_| {
        StorageError::Serialization(format!("negative version_number {version} for {id}"))
    })?;

    Ok(Portfolio::restore(
        AggregateId::new(id),
        row.try_get("name")?,
        assets,
        version_number,
    ))
}

fn row_to_asset(row: &PgRow) -> Result<PortfolioAsset> {
    Ok(PortfolioAsset::new(
        row.try_get::<String, _>("symbol")?,
        row.try_get::<f64, _>("weight")?,
    ))
}

fn version_to_db(version: u64) -> Result<i64> {
    i64::try_from(version)
        .map_err(|_| StorageError::Serialization(format!("version_number {version} out of range")))
}
