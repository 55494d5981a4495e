//! External capabilities the core talks to: embeddings and text completion.
//!
//! Both are reached over HTTP and both are treated as slow and fallible. The
//! HTTP implementations wrap every call in a [`RetryPolicy`]; callers above this
//! layer turn whatever error remains into a degraded answer.

mod completion;
mod embedding;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use reqwest::Client;

use crate::config::Config;
use crate::error::ProviderError;
use crate::models::ChatMessage;

pub use completion::OpenAiChat;
pub use embedding::{OllamaEmbedder, OpenAiEmbedder};
pub use retry::RetryPolicy;

/// Incremental completion output. Items are deltas, not prefixes.
pub type TokenStream = BoxStream<'static, Result<String, ProviderError>>;

/// Maps text to a fixed-width dense vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError>;

    /// Providers without native streaming deliver the whole answer as one delta.
    async fn complete_stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, ProviderError> {
        let text = self.complete(system_prompt, messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }

    fn model_name(&self) -> &str;
}

/// Embeds `text`, mapping blank input and provider failure to `None`.
pub async fn embed_or_skip(provider: &dyn EmbeddingProvider, text: &str) -> Option<Vec<f32>> {
    if text.trim().is_empty() {
        return None;
    }

    match provider.embed(text).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            crate::metrics::provider_failure("embedding");
            tracing::warn!(
                model = provider.model_name(),
                error = %e,
                "embedding failed, skipping text"
            );
            None
        }
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

/// Client without a whole-request deadline, for bodies that stream for longer
/// than any single request timeout. Callers bound the waits themselves.
pub(crate) fn build_streaming_client(connect_timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {}", e)))
}

pub(crate) fn status_error(
    status: reqwest::StatusCode,
    body: String,
    provider: &str,
) -> ProviderError {
    // 5xx and 429 are transient; everything else is the caller's problem.
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Network(format!("{} API error {}: {}", provider, status, body))
    } else {
        ProviderError::Api(format!("{} API error {}: {}", provider, status, body))
    }
}

pub fn embedder_from_config(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let provider: Arc<dyn EmbeddingProvider> = match config.embedding_provider.as_str() {
        "ollama" => Arc::new(OllamaEmbedder::new(
            config.embedding_model.clone(),
            Some(config.embedding_base_url.clone()),
            config.embedding_dimension,
            config.request_timeout(),
            config.retry_policy(),
        )?),
        "openai" => {
            let api_key = config
                .api_key()
                .ok_or_else(|| ProviderError::Configuration("OPENAI_API_KEY not set".to_string()))?;
            Arc::new(OpenAiEmbedder::new(
                api_key.to_string(),
                config.embedding_model.clone(),
                Some(config.embedding_base_url.clone()),
                config.embedding_dimension,
                config.request_timeout(),
                config.retry_policy(),
            )?)
        }
        other => {
            return Err(ProviderError::Configuration(format!(
                "unknown embedding provider '{}'",
                other
            )))
        }
    };
    Ok(provider)
}
