//! Portfolio command and query endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{AggregateId, CorrelationId};
use domain::{CreatePortfolio, DeletePortfolio, Portfolio, UpdatePortfolio};
use messagebus::{PortfolioView, get_portfolio, list_portfolios};
use serde::{Deserialize, Serialize};
use unit_of_work::UnitOfWorkFactory;

use crate::AppState;
use crate::error::ApiError;

/// Header carrying the caller's correlation ID.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

// -- Request types --

#[derive(Deserialize)]
pub struct CreatePortfolioRequest {
    /// Generated when absent.
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub assets: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
pub struct UpdatePortfolioRequest {
    pub name: String,
    #[serde(default)]
    pub assets: BTreeMap<String, f64>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CreatedResponse {
    pub ok: bool,
    pub msg: String,
    pub id: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub ok: bool,
    pub msg: String,
}

#[derive(Serialize)]
pub struct ResultResponse<T> {
    pub ok: bool,
    pub msg: String,
    pub result: T,
}

// -- Handlers --

/// POST /portfolios — create a new portfolio.
#[tracing::instrument(skip_all)]
pub async fn create<F>(
    State(state): State<Arc<AppState<F>>>,
    headers: HeaderMap,
    payload: Result<Json<CreatePortfolioRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedResponse>), ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let Json(req) = payload.map_err(rejected)?;
    let id = req.id.map(AggregateId::new).unwrap_or_else(AggregateId::generate);

    let mut command = CreatePortfolio::new(id.clone(), req.name, req.assets);
    if let Some(correlation_id) = correlation_id(&headers) {
        command = command.with_correlation_id(correlation_id);
    }
    let name = command.name.clone();
    state.bus.execute(command).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            ok: true,
            msg: format!("Successfully created portfolio '{name}' with id '{id}'."),
            id: id.to_string(),
        }),
    ))
}

/// GET /portfolios — list every portfolio.
#[tracing::instrument(skip_all)]
pub async fn list<F>(
    State(state): State<Arc<AppState<F>>>,
) -> Result<Json<ResultResponse<Vec<PortfolioView>>>, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let portfolios = list_portfolios(state.bus.uow_factory()).await?;

    Ok(Json(ResultResponse {
        ok: true,
        msg: "Successfully fetched all portfolios.".to_string(),
        result: portfolios,
    }))
}

/// GET /portfolio/{id} — fetch one portfolio.
#[tracing::instrument(skip(state))]
pub async fn get<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(id): Path<String>,
) -> Result<Json<ResultResponse<PortfolioView>>, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let portfolio = get_portfolio(state.bus.uow_factory(), &AggregateId::new(id.as_str()))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Portfolio with ID {id} not found.")))?;

    Ok(Json(ResultResponse {
        ok: true,
        msg: format!("Successfully fetched portfolio '{id}'."),
        result: portfolio,
    }))
}

/// PUT /portfolio/{id} — replace a portfolio's name and assets.
#[tracing::instrument(skip(state, headers, payload))]
pub async fn update<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdatePortfolioRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let Json(req) = payload.map_err(rejected)?;

    let mut command = UpdatePortfolio::new(id.as_str(), req.name, req.assets);
    if let Some(correlation_id) = correlation_id(&headers) {
        command = command.with_correlation_id(correlation_id);
    }
    state.bus.execute(command).await?;

    Ok(Json(MessageResponse {
        ok: true,
        msg: format!("Successfully updated portfolio '{id}'."),
    }))
}

/// DELETE /portfolio/{id} — delete a portfolio.
#[tracing::instrument(skip(state, headers))]
pub async fn delete<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    let mut command = DeletePortfolio::new(id.as_str());
    if let Some(correlation_id) = correlation_id(&headers) {
        command = command.with_correlation_id(correlation_id);
    }
    state.bus.execute(command).await?;

    Ok(Json(MessageResponse {
        ok: true,
        msg: format!("Successfully deleted portfolio '{id}'."),
    }))
}

fn rejected(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(format!(
        "Failed to process request: {}",
        rejection.body_text()
    ))
}

fn correlation_id(headers: &HeaderMap) -> Option<CorrelationId> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(CorrelationId::from)
}
