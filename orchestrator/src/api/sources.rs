use std::sync::Arc;

use tracing::info;
use warp::{Rejection, Reply};

use crate::models::RetrieveRequest;
use crate::pipeline::Orchestrator;

pub async fn handle_retrieve_sources(
    request: RetrieveRequest,
    orchestrator: Arc<Orchestrator>,
) -> Result<impl Reply, Rejection> {
    let sources = orchestrator.retrieve_sources(&request.query).await;
    info!(hits = sources.len(), "Retrieved sources");
    Ok(warp::reply::json(&sources))
}

pub async fn handle_list_sources(orchestrator: Arc<Orchestrator>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&orchestrator.list_sources()))
}
