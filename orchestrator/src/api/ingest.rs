use std::sync::Arc;

use tracing::{info, warn};
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::error::ApiError;
use crate::models::{DeleteSourceParams, IngestRequest};
use crate::pipeline::Orchestrator;

pub async fn handle_add_documents(
    request: IngestRequest,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    if request.chunks.is_empty() {
        return Err(warp::reject::custom(ApiError::BadRequest(
            "no chunks supplied".to_string(),
        )));
    }
    if let Some(chunk) = request.chunks.iter().find(|c| c.page == 0) {
        return Err(warp::reject::custom(ApiError::BadRequest(format!(
            "page numbers start at 1 (chunk {} of '{}' has page 0)",
            chunk.chunk_index, chunk.source
        ))));
    }

    info!(chunks = request.chunks.len(), "Ingesting document chunks");
    let outcome = orchestrator.add_documents(request.chunks).await;
    if !outcome.success {
        warn!(message = %outcome.message, "ingestion added nothing");
    }

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok(warp::reply::with_status(warp::reply::json(&outcome), status))
}

pub async fn handle_clear_collection(
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    warn!("Clearing the whole collection");
    let outcome = orchestrator.clear_collection().await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok(warp::reply::with_status(warp::reply::json(&outcome), status))
}

pub async fn handle_delete_source(
    params: DeleteSourceParams,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    info!(source = %params.source, "Deleting source");
    let outcome = orchestrator.delete_by_source(&params.source).await;

    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok(warp::reply::with_status(warp::reply::json(&outcome), status))
}
