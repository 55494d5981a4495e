use std::sync::Arc;

use warp::{Filter, Rejection, Reply};

use crate::middleware::{self, Limiter};
use crate::models::DeleteSourceParams;
use crate::pipeline::Orchestrator;

mod ingest;
mod query;
mod sources;
mod stats;

/// Largest accepted JSON body (ingest batches are the big ones).
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

pub fn routes(
    orchestrator: Arc<Orchestrator>,
    limiter: Option<Limiter>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let api = warp::path("api").and(warp::path("v1"));

    let query_route = api
        .and(warp::path("query"))
        .and(warp::path::end())
        .and(warp::post())
        .and(middleware::rate_limit(limiter.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(query::handle_query);

    let stream_route = api
        .and(warp::path!("query" / "stream"))
        .and(warp::post())
        .and(middleware::rate_limit(limiter))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(query::handle_stream_query);

    let retrieve_route = api
        .and(warp::path!("sources" / "retrieve"))
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(sources::handle_retrieve_sources);

    let list_sources_route = api
        .and(warp::path("sources"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(sources::handle_list_sources);

    let add_documents_route = api
        .and(warp::path("documents"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(ingest::handle_add_documents);

    let delete_source_route = api
        .and(warp::path("documents"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(warp::query::<DeleteSourceParams>())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(ingest::handle_delete_source);

    let clear_route = api
        .and(warp::path("collection"))
        .and(warp::path::end())
        .and(warp::delete())
        .and(with_orchestrator(orchestrator.clone()))
        .and_then(ingest::handle_clear_collection);

    let stats_route = api
        .and(warp::path("stats"))
        .and(warp::path::end())
        .and(warp::get())
        .and(with_orchestrator(orchestrator))
        .and_then(stats::handle_stats);

    query_route
        .or(stream_route)
        .or(retrieve_route)
        .or(list_sources_route)
        .or(add_documents_route)
        .or(delete_source_route)
        .or(clear_route)
        .or(stats_route)
}

fn with_orchestrator(
    orchestrator: Arc<Orchestrator>,
) -> impl Filter<Extract = (Arc<Orchestrator>,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || orchestrator.clone())
}
