//! OpenAI-compatible chat completions, blocking and SSE streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{build_streaming_client, status_error, CompletionProvider, RetryPolicy, TokenStream};
use crate::error::ProviderError;
use crate::models::ChatMessage;

pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        model: String,
        endpoint: Option<String>,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Configuration("API key required".to_string()));
        }

        Ok(Self {
            client: build_streaming_client(timeout)?,
            endpoint: endpoint.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model,
            timeout,
            retry,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint.trim_end_matches('/'))
    }

    fn request<'a>(
        &'a self,
        system_prompt: &'a str,
        messages: &'a [ChatMessage],
        stream: bool,
    ) -> ChatRequest<'a> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage { role: "system", content: system_prompt });
        wire.extend(messages.iter().map(|m| WireMessage {
            role: match m.role {
                crate::models::Role::System => "system",
                crate::models::Role::User => "user",
                crate::models::Role::Assistant => "assistant",
            },
            content: &m.content,
        }));

        ChatRequest { model: &self.model, messages: wire, stream }
    }

    /// Sends the request. `whole_body` bounds the full exchange; otherwise only
    /// the wait for response headers is bounded and the body may run long.
    async fn send(
        &self,
        request: &ChatRequest<'_>,
        whole_body: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let builder = self
            .client
            .post(self.chat_url())
            .bearer_auth(&self.api_key)
            .json(request);

        let response = if whole_body {
            builder.timeout(self.timeout).send().await?
        } else {
            tokio::time::timeout(self.timeout, builder.send())
                .await
                .map_err(|_| ProviderError::Timeout)??
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body, "OpenAI"));
        }

        Ok(response)
    }

    async fn complete_once(&self, request: &ChatRequest<'_>) -> Result<String, ProviderError> {
        let response: ChatResponse = self.send(request, true).await?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let request = self.request(system_prompt, messages, false);
        self.retry
            .run("chat_completion", || self.complete_once(&request))
            .await
    }

    async fn complete_stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, ProviderError> {
        let request = self.request(system_prompt, messages, true);
        // Only opening the stream is retried; a broken body surfaces to the consumer.
        let response = self
            .retry
            .run("chat_completion_stream", || self.send(&request, false))
            .await?;

        Ok(sse_tokens(response.bytes_stream(), self.timeout))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Turns an SSE byte stream into content deltas. Each wait for the next chunk
/// is bounded by `idle`; the stream as a whole is not.
fn sse_tokens<S, B, E>(body: S, idle: Duration) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();
        'read: loop {
            let chunk = match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => {
                    yield Err(ProviderError::Network(e.to_string()));
                    break 'read;
                }
                Ok(None) => break 'read,
                Err(_) => {
                    yield Err(ProviderError::Timeout);
                    break 'read;
                }
            };
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(line_end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=line_end).collect();
                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    SseLine::Delta(text) => yield Ok::<String, ProviderError>(text),
                    SseLine::Done => break 'read,
                    SseLine::Skip => {}
                }
            }
        }
    };
    Box::pin(stream)
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty())
            .map(SseLine::Delta)
            .unwrap_or(SseLine::Skip),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring unparsable stream chunk");
            SseLine::Skip
        }
    }
}

// OpenAI API types
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
