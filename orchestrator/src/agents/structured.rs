// Structured Agent: hands customer/ticket questions to the structured query service

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::db::{self, DbPool};
use crate::error::ProviderError;
use crate::models::{recent_history, ChatMessage, QueryResponse};
use crate::providers::{build_client, status_error, RetryPolicy};

/// Entity tables reported by `stats()`.
pub const ENTITY_TABLES: [&str; 2] = ["customers", "tickets"];

/// Natural-language access to the relational customer store. Query generation
/// and execution live behind this boundary.
#[async_trait]
pub trait StructuredBackend: Send + Sync {
    async fn answer(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError>;

    /// Row counts per entity table.
    async fn stats(&self) -> Result<BTreeMap<String, i64>, ProviderError>;
}

#[derive(Debug, Serialize)]
struct StructuredRequest<'a> {
    query: &'a str,
    conversation_history: &'a [ChatMessage],
}

pub struct HttpStructuredBackend {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
    memory_window: usize,
    pool: Option<DbPool>,
}

impl HttpStructuredBackend {
    pub fn new(
        endpoint: String,
        timeout: Duration,
        retry: RetryPolicy,
        memory_window: usize,
        pool: Option<DbPool>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            retry,
            memory_window,
            pool,
        })
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.endpoint.trim_end_matches('/'))
    }

    async fn request(&self, body: &StructuredRequest<'_>) -> Result<String, ProviderError> {
        let response = self.client.post(self.query_url()).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text, "Structured service"));
        }

        let reply: QueryResponse = response.json().await?;
        if reply.success {
            Ok(reply.response)
        } else {
            Err(ProviderError::Api(
                reply
                    .error
                    .unwrap_or_else(|| "structured service reported failure".to_string()),
            ))
        }
    }
}

#[async_trait]
impl StructuredBackend for HttpStructuredBackend {
    async fn answer(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        info!("Structured: forwarding question");
        let body = StructuredRequest {
            query: question,
            conversation_history: recent_history(history, self.memory_window),
        };
        self.retry.run("structured_query", || self.request(&body)).await
    }

    async fn stats(&self) -> Result<BTreeMap<String, i64>, ProviderError> {
        let Some(pool) = &self.pool else {
            return Ok(BTreeMap::new());
        };

        let mut counts = BTreeMap::new();
        for table in ENTITY_TABLES {
            let count = db::count_rows(pool, table)
                .await
                .map_err(|e| ProviderError::Api(format!("database error: {}", e)))?;
            counts.insert(table.to_string(), count);
        }
        Ok(counts)
    }
}
