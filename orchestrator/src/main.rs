use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use warp::Filter;

use support_orchestrator::agents::{HttpStructuredBackend, StructuredBackend};
use support_orchestrator::config::Config;
use support_orchestrator::error::handle_rejection;
use support_orchestrator::index::VectorIndex;
use support_orchestrator::pipeline::Orchestrator;
use support_orchestrator::providers::{self, CompletionProvider, OpenAiChat};
use support_orchestrator::{api, db, middleware};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!("Starting customer support orchestrator");

    let embedder = providers::embedder_from_config(&config)?;
    info!(
        provider = %config.embedding_provider,
        model = embedder.model_name(),
        dimensions = embedder.dimensions(),
        "Embedding provider configured"
    );

    let index = VectorIndex::open(&config.vector_store_path, config.metric()?, embedder)
        .context("failed to open vector index")?;
    index
        .verify_embedder()
        .await
        .context("embedding provider failed the startup check")?;
    info!(documents = index.len(), "Vector index ready");

    let api_key = config
        .api_key()
        .context("OPENAI_API_KEY not set in environment")?
        .to_string();
    let llm: Arc<dyn CompletionProvider> = Arc::new(OpenAiChat::new(
        api_key,
        config.openai_model.clone(),
        Some(config.openai_base_url.clone()),
        config.request_timeout(),
        config.retry_policy(),
    )?);

    let db_pool = match &config.database_url {
        Some(url) => {
            info!("Database pool configured (lazy)");
            Some(db::create_pool(url)?)
        }
        None => None,
    };
    let structured: Arc<dyn StructuredBackend> = Arc::new(HttpStructuredBackend::new(
        config.structured_service_url.clone(),
        config.request_timeout(),
        config.retry_policy(),
        config.memory_window,
        db_pool,
    )?);

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(index),
        llm,
        structured,
        config.top_k_retrieval,
        config.memory_window,
    ));

    // Build API routes
    let limiter = middleware::rate_limiter(config.max_requests_per_minute);
    let api_routes = api::routes(orchestrator, limiter)
        .with(warp::log("api"))
        .with(middleware::cors());

    // Health check route
    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({"status": "healthy"})));

    // Metrics route
    let metrics = warp::path("metrics").and(warp::get()).map(|| {
        use prometheus::{Encoder, TextEncoder};
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        warp::reply::with_header(buffer, "Content-Type", encoder.format_type())
    });

    let routes = health.or(metrics).or(api_routes).recover(handle_rejection);

    // Start server
    let addr = ([0, 0, 0, 0], config.port);
    info!("Server listening on {}", config.port);

    warp::serve(routes).run(addr).await;

    Ok(())
}
