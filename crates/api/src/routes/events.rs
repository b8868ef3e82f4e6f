//! Server-sent event streams.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, Sse};
use domain::Portfolio;
use futures_util::{Stream, StreamExt};
use streams::Frame;
use unit_of_work::UnitOfWorkFactory;

use crate::AppState;
use crate::error::ApiError;

/// GET /events/{topic}
///
/// Streams every event published on `topic` as it is consumed from the
/// broker. Each payload is sent as a `data:` line holding the event body.
/// When nothing arrives within the heartbeat interval a `heartbeat` event is
/// sent instead. The subscription is released when the client disconnects.
#[tracing::instrument(skip(state))]
pub async fn stream<F>(
    State(state): State<Arc<AppState<F>>>,
    Path(topic): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError>
where
    F: UnitOfWorkFactory<Aggregate = Portfolio>,
{
    if !state.topics.contains(&topic) {
        return Err(ApiError::BadRequest(format!("Unknown topic '{topic}'.")));
    }

    metrics::counter!("api_sse_connections_total", "topic" => topic.clone()).increment(1);
    let subscription = state.streams.subscribe(topic);
    tracing::info!("client subscribed");

    let events = subscription
        .into_stream(state.heartbeat)
        .map(|frame| {
            let event = match frame {
                Frame::Payload(payload) => SseEvent::default().data(payload),
                Frame::Heartbeat => SseEvent::default().event("heartbeat").data("{}"),
            };
            Ok::<_, Infallible>(event)
        });

    Ok(Sse::new(events))
}
