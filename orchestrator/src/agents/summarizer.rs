// Summarizer Agent: answers from retrieved policy context with mandatory citations

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{info, warn};

use super::retriever::RetrieverAgent;
use crate::error::ProviderError;
use crate::metrics;
use crate::models::{recent_history, ChatMessage};
use crate::providers::CompletionProvider;

pub const NO_RELEVANT_INFORMATION: &str = "I couldn't find relevant information in the policy \
    documents to answer your question. Please try rephrasing or contact support directly.";

const ANSWER_PROMPT: &str = "You are a helpful customer support assistant that answers questions based on company policy documents.

Instructions:
1. Answer questions using ONLY information from the provided context
2. Include inline citations with format [Source: filename.pdf, Page X]
3. If information isn't in the context, say so clearly
4. Be concise but complete
5. Format answers in a user-friendly way

Context from policy documents:
";

/// A prompt grounded in retrieved context, ready for the completion provider.
struct GroundedPrompt {
    system: String,
    messages: Vec<ChatMessage>,
}

pub struct SummarizerAgent {
    retriever: Arc<RetrieverAgent>,
    llm: Arc<dyn CompletionProvider>,
    memory_window: usize,
}

impl SummarizerAgent {
    pub fn new(
        retriever: Arc<RetrieverAgent>,
        llm: Arc<dyn CompletionProvider>,
        memory_window: usize,
    ) -> Self {
        Self { retriever, llm, memory_window }
    }

    async fn prepare(&self, question: &str, history: &[ChatMessage]) -> Option<GroundedPrompt> {
        let results = self.retriever.retrieve(question, None).await;
        if results.is_empty() {
            info!("Summarizer: no context retrieved, skipping completion");
            return None;
        }

        let context = RetrieverAgent::format_context(&results);
        let mut messages: Vec<ChatMessage> = recent_history(history, self.memory_window).to_vec();
        messages.push(ChatMessage::user(question));

        Some(GroundedPrompt {
            system: format!("{}{}\n", ANSWER_PROMPT, context),
            messages,
        })
    }

    /// Grounded answer, or the fixed no-information message when nothing was
    /// retrieved. Only a completion failure is an error.
    pub async fn try_answer(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let Some(prompt) = self.prepare(question, history).await else {
            return Ok(NO_RELEVANT_INFORMATION.to_string());
        };

        self.llm.complete(&prompt.system, &prompt.messages).await.map_err(|e| {
            metrics::provider_failure("completion");
            warn!(error = %e, "answer generation failed");
            e
        })
    }

    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> String {
        self.try_answer(question, history)
            .await
            .unwrap_or_else(|e| generation_error(&e))
    }

    /// Growing prefixes of the answer. Always yields at least once; the last
    /// item is the complete answer.
    pub async fn answer_stream(
        &self,
        question: &str,
        history: &[ChatMessage],
    ) -> BoxStream<'static, String> {
        let Some(prompt) = self.prepare(question, history).await else {
            return stream::once(async { NO_RELEVANT_INFORMATION.to_string() }).boxed();
        };

        let llm = Arc::clone(&self.llm);
        let prefixes = async_stream::stream! {
            let mut tokens = match llm.complete_stream(&prompt.system, &prompt.messages).await {
                Ok(tokens) => tokens,
                Err(e) => {
                    metrics::provider_failure("completion");
                    warn!(error = %e, "answer stream failed to open");
                    yield generation_error(&e);
                    return;
                }
            };

            let mut buffer = String::new();
            let mut yielded = false;
            while let Some(delta) = tokens.next().await {
                match delta {
                    Ok(text) => {
                        buffer.push_str(&text);
                        yielded = true;
                        yield buffer.clone();
                    }
                    Err(e) => {
                        metrics::provider_failure("completion");
                        warn!(error = %e, "answer stream interrupted");
                        if buffer.is_empty() {
                            buffer = generation_error(&e);
                        } else {
                            buffer.push_str(&format!("\n\n[{}]", generation_error(&e)));
                        }
                        yielded = true;
                        yield buffer.clone();
                        break;
                    }
                }
            }

            if !yielded {
                yield buffer;
            }
        };

        prefixes.boxed()
    }
}

pub(crate) fn generation_error(e: &ProviderError) -> String {
    format!("Error generating response: {}", e)
}
