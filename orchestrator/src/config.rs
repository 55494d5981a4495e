use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::Deserialize;

use crate::index::DistanceMetric;
use crate::providers::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub embedding_provider: String,
    pub embedding_base_url: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub vector_store_path: PathBuf,
    pub distance_metric: String,
    pub top_k_retrieval: usize,
    pub memory_window: usize,
    pub structured_service_url: String,
    pub database_url: Option<String>,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_requests_per_minute: u32,
    pub log_level: String,
}

impl Config {
    /// Defaults, then `config/support.*` if present, then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = config::Config::builder()
            .set_default("port", 8080)?
            .set_default("openai_model", "gpt-5-mini")?
            .set_default("openai_base_url", "https://api.openai.com/v1")?
            .set_default("embedding_provider", "ollama")?
            .set_default("embedding_base_url", "http://localhost:11434")?
            .set_default("embedding_model", "nomic-embed-text")?
            .set_default("embedding_dimension", 768)?
            .set_default("vector_store_path", "./vectorstore")?
            .set_default("distance_metric", "l2")?
            .set_default("top_k_retrieval", 4)?
            .set_default("memory_window", 5)?
            .set_default("structured_service_url", "http://localhost:8001")?
            .set_default("request_timeout_secs", 60)?
            .set_default("max_retries", 3)?
            .set_default("initial_backoff_ms", 250)?
            .set_default("max_requests_per_minute", 120)?
            .set_default("log_level", "info")?
            .add_source(config::File::with_name("config/support").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Startup checks. Anything rejected here must stop the service before it serves traffic.
    pub fn validate(&self) -> Result<()> {
        if self.api_key().is_none() {
            bail!("OPENAI_API_KEY not set in environment");
        }
        if self.embedding_dimension == 0 {
            bail!("EMBEDDING_DIMENSION must be greater than zero");
        }
        if self.top_k_retrieval == 0 {
            bail!("TOP_K_RETRIEVAL must be greater than zero");
        }
        if !matches!(self.embedding_provider.as_str(), "ollama" | "openai") {
            bail!(
                "unknown EMBEDDING_PROVIDER '{}' (expected 'ollama' or 'openai')",
                self.embedding_provider
            );
        }
        self.metric()?;
        Ok(())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    pub fn metric(&self) -> Result<DistanceMetric> {
        self.distance_metric.parse()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        port: 8080,
        openai_api_key: Some("sk-test".to_string()),
        openai_model: "gpt-5-mini".to_string(),
        openai_base_url: "https://api.openai.com/v1".to_string(),
        embedding_provider: "ollama".to_string(),
        embedding_base_url: "http://localhost:11434".to_string(),
        embedding_model: "nomic-embed-text".to_string(),
        embedding_dimension: 768,
        vector_store_path: PathBuf::from("./vectorstore"),
        distance_metric: "l2".to_string(),
        top_k_retrieval: 4,
        memory_window: 5,
        structured_service_url: "http://localhost:8001".to_string(),
        database_url: None,
        request_timeout_secs: 60,
        max_retries: 3,
        initial_backoff_ms: 250,
        max_requests_per_minute: 120,
        log_level: "info".to_string(),
    }
}
