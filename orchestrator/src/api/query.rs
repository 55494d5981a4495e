use std::convert::Infallible;
use std::sync::Arc;

use futures::{stream, StreamExt};
use tracing::info;
use uuid::Uuid;
use warp::sse::Event;
use warp::{Rejection, Reply};

use crate::models::{QueryRequest, QueryResponse};
use crate::pipeline::Orchestrator;

pub async fn handle_query(
    request: QueryRequest,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    let request_id = Uuid::new_v4();
    info!(%request_id, "Processing query");

    let history = request.conversation_history.unwrap_or_default();
    let response = orchestrator.query(&request.query, &history).await;

    info!(%request_id, response_len = response.len(), "Query answered");
    Ok(warp::reply::json(&QueryResponse {
        response,
        success: true,
        error: None,
    }))
}

/// One `prefix` event per growing prefix, then a `done` event.
pub async fn handle_stream_query(
    request: QueryRequest,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    let request_id = Uuid::new_v4();
    info!(%request_id, "Streaming query");

    let history = request.conversation_history.unwrap_or_default();
    let events = orchestrator
        .stream_query(request.query, history)
        .map(|prefix| Ok::<Event, Infallible>(Event::default().event("prefix").data(prefix)))
        .chain(stream::once(async {
            Ok::<Event, Infallible>(Event::default().event("done").data("[DONE]"))
        }));

    Ok(warp::sse::reply(warp::sse::keep_alive().stream(events)))
}
