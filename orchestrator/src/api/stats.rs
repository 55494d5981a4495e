use std::sync::Arc;

use warp::{Rejection, Reply};

use crate::pipeline::Orchestrator;

pub async fn handle_stats(orchestrator: Arc<Orchestrator>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&orchestrator.stats().await))
}
