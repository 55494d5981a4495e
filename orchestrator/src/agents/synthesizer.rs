// Synthesizer Agent: fuses structured and policy answers into one response

use std::sync::Arc;

use tracing::{info, warn};

use crate::metrics;
use crate::models::ChatMessage;
use crate::providers::CompletionProvider;

const SYNTHESIS_SYSTEM: &str =
    "You are a helpful assistant that combines information from multiple sources.";

pub struct SynthesizerAgent {
    llm: Arc<dyn CompletionProvider>,
}

impl SynthesizerAgent {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// One combined answer. Falls back to both raw answers joined by a blank
    /// line if the completion call fails.
    pub async fn combine(&self, structured: &str, retrieval: &str) -> String {
        info!("Synthesizer: combining answers");
        let prompt = format!(
            "Combine these two responses into a single, coherent answer:\n\n\
             SQL Agent Response (Customer Data):\n{}\n\n\
             RAG Agent Response (Policy Information):\n{}\n\n\
             Provide a unified response that addresses the user's question completely.",
            structured, retrieval
        );

        match self.llm.complete(SYNTHESIS_SYSTEM, &[ChatMessage::user(prompt)]).await {
            Ok(combined) if !combined.trim().is_empty() => combined,
            Ok(_) => {
                warn!("synthesis returned empty text, concatenating answers");
                concatenate(structured, retrieval)
            }
            Err(e) => {
                metrics::provider_failure("synthesis");
                warn!(error = %e, "synthesis failed, concatenating answers");
                concatenate(structured, retrieval)
            }
        }
    }
}

fn concatenate(structured: &str, retrieval: &str) -> String {
    format!("{}\n\n{}", structured, retrieval)
}
