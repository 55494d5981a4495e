//! Query pipeline: ROUTING, one DISPATCH stage, SYNTHESIZE, DONE.
//!
//! Every query walks the same stages in order. Stages record into a single
//! [`OrchestrationState`]; nothing past this module sees an error type, every
//! outcome is rendered to text.

mod state;
mod stream;

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::agents::summarizer::generation_error;
use crate::agents::{
    RetrieverAgent, RouterAgent, StructuredBackend, SummarizerAgent, SynthesizerAgent,
};
use crate::error::ProviderError;
use crate::index::VectorIndex;
use crate::metrics;
use crate::models::{
    AdminOutcome, AgentKind, ChatMessage, DocumentChunk, ServiceStats, SourcePreview,
    SourceSummary,
};
use crate::providers::CompletionProvider;

pub use state::{OrchestrationState, Stage};

const NO_RESPONSE: &str = "No response generated";

pub struct Orchestrator {
    router: RouterAgent,
    retriever: Arc<RetrieverAgent>,
    summarizer: SummarizerAgent,
    structured: Arc<dyn StructuredBackend>,
    synthesizer: SynthesizerAgent,
}

impl Orchestrator {
    pub fn new(
        index: Arc<VectorIndex>,
        llm: Arc<dyn CompletionProvider>,
        structured: Arc<dyn StructuredBackend>,
        top_k: usize,
        memory_window: usize,
    ) -> Self {
        let retriever = Arc::new(RetrieverAgent::new(index, top_k));
        Self {
            router: RouterAgent::new(Arc::clone(&llm)),
            summarizer: SummarizerAgent::new(
                Arc::clone(&retriever),
                Arc::clone(&llm),
                memory_window,
            ),
            synthesizer: SynthesizerAgent::new(llm),
            retriever,
            structured,
        }
    }

    fn index(&self) -> &VectorIndex {
        self.retriever.index()
    }

    /// Runs the full pipeline. Always returns text, never an error.
    #[instrument(skip_all, fields(query_len = query.len()))]
    pub async fn query(&self, query: &str, history: &[ChatMessage]) -> String {
        let _timer = metrics::QUERY_DURATION.start_timer();
        let mut state = OrchestrationState::new(query, history.to_vec());
        let mut stage = Stage::Routing;

        while stage != Stage::Done {
            self.run_stage(stage, &mut state).await;
            stage = stage.next(&state);
        }

        state.final_response.unwrap_or_else(|| NO_RESPONSE.to_string())
    }

    async fn run_stage(&self, stage: Stage, state: &mut OrchestrationState) {
        tracing::debug!(stage = stage.as_str(), "entering stage");
        match stage {
            Stage::Routing => self.route(state).await,
            _ if state.error.is_some() && stage != Stage::Synthesize => {
                tracing::debug!(
                    stage = stage.as_str(),
                    "pipeline error recorded, skipping backend calls"
                );
            }
            Stage::DispatchStructured => {
                let answer = self
                    .structured
                    .answer(&state.query, &state.conversation_history)
                    .await;
                state.structured_result = Some(answer.unwrap_or_else(|e| structured_error(&e)));
            }
            Stage::DispatchRetrieval => {
                state.retrieval_result =
                    Some(self.summarizer.answer(&state.query, &state.conversation_history).await);
            }
            Stage::DispatchBoth => {
                let (structured, retrieval) = tokio::join!(
                    self.structured.answer(&state.query, &state.conversation_history),
                    self.summarizer.try_answer(&state.query, &state.conversation_history),
                );
                match (structured, retrieval) {
                    (Err(s), Err(r)) => {
                        metrics::provider_failure("structured");
                        state.error = Some(format!(
                            "Both backends failed (structured: {}; retrieval: {})",
                            s, r
                        ));
                    }
                    (structured, retrieval) => {
                        state.structured_result =
                            Some(structured.unwrap_or_else(|e| structured_error(&e)));
                        state.retrieval_result =
                            Some(retrieval.unwrap_or_else(|e| generation_error(&e)));
                    }
                }
            }
            Stage::Synthesize => {
                let final_response = self.synthesize(state).await;
                state.final_response = Some(final_response);
            }
            Stage::Done => {}
        }
    }

    async fn route(&self, state: &mut OrchestrationState) {
        if state.query.trim().is_empty() {
            state.error = Some("Query is empty".to_string());
            return;
        }

        let decision = self.router.route(&state.query).await;
        metrics::record_route(decision.agent.as_str());
        info!(
            agent = decision.agent.as_str(),
            confidence = ?decision.confidence,
            reasoning = %decision.reasoning,
            "query routed"
        );
        state.route_decision = Some(decision);
    }

    async fn synthesize(&self, state: &OrchestrationState) -> String {
        if let Some(error) = &state.error {
            return format!("Error: {}", error);
        }

        match state.agent() {
            AgentKind::Structured => state
                .structured_result
                .clone()
                .unwrap_or_else(|| "No response from structured backend".to_string()),
            AgentKind::Retrieval => state
                .retrieval_result
                .clone()
                .unwrap_or_else(|| "No response from retrieval backend".to_string()),
            AgentKind::Both => {
                let structured = state.structured_result.as_deref().unwrap_or_default();
                let retrieval = state.retrieval_result.as_deref().unwrap_or_default();
                self.synthesizer.combine(structured, retrieval).await
            }
        }
    }

    /// Retrieval hits for `query` without answer generation.
    pub async fn retrieve_sources(&self, query: &str) -> Vec<SourcePreview> {
        self.retriever.sources(query).await
    }

    pub async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> AdminOutcome {
        self.index().add_documents(chunks).await
    }

    pub async fn delete_by_source(&self, source: &str) -> AdminOutcome {
        match self.index().delete_by_source(source).await {
            Ok(0) => AdminOutcome::failed(format!("No documents found for source '{}'", source)),
            Ok(removed) => {
                AdminOutcome::ok(format!("Deleted {} chunks from '{}'", removed, source))
            }
            Err(e) => {
                warn!(source, error = %e, "delete failed");
                AdminOutcome::failed(format!("Error deleting documents: {}", e))
            }
        }
    }

    /// Drops the whole collection.
    pub async fn clear_collection(&self) -> AdminOutcome {
        let removed = self.index().len();
        match self.index().clear().await {
            Ok(()) => AdminOutcome::ok(format!("Cleared {} chunks from the collection", removed)),
            Err(e) => {
                warn!(error = %e, "clear failed");
                AdminOutcome::failed(format!("Error clearing collection: {}", e))
            }
        }
    }

    pub fn list_sources(&self) -> Vec<SourceSummary> {
        self.index().list_sources()
    }

    pub async fn stats(&self) -> ServiceStats {
        let (structured, structured_error) = match self.structured.stats().await {
            Ok(counts) => (counts, None),
            Err(e) => {
                warn!(error = %e, "structured stats unavailable");
                (Default::default(), Some(e.to_string()))
            }
        };

        ServiceStats {
            index: self.index().stats(),
            structured,
            structured_error,
        }
    }
}

fn structured_error(e: &ProviderError) -> String {
    metrics::provider_failure("structured");
    warn!(error = %e, "structured backend failed");
    format!("Structured query error: {}", e)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agents::NO_RELEVANT_INFORMATION;
    use crate::index::DistanceMetric;
    use crate::test_support::{FakeStructured, HashEmbedder, ScriptedCompletion};

    pub(crate) const ROUTE_SQL: &str =
        r#"{"agent": "SQL_AGENT", "reasoning": "customer data", "confidence": "high"}"#;
    pub(crate) const ROUTE_RAG: &str =
        r#"{"agent": "RAG_AGENT", "reasoning": "policy", "confidence": "high"}"#;
    const ROUTE_BOTH: &str = r#"{"agent": "BOTH", "reasoning": "mixed", "confidence": "medium"}"#;

    pub(crate) async fn refund_index(dir: &std::path::Path) -> Arc<VectorIndex> {
        let index =
            VectorIndex::open(dir, DistanceMetric::L2, Arc::new(HashEmbedder::new(64))).unwrap();
        let outcome = index
            .add_documents(vec![DocumentChunk {
                text: "Refunds are processed in 5-7 days.".to_string(),
                source: "refund.pdf".to_string(),
                page: 1,
                chunk_index: 0,
                id: Some("c0".to_string()),
            }])
            .await;
        assert!(outcome.success);
        Arc::new(index)
    }

    fn orchestrator(
        index: Arc<VectorIndex>,
        llm: Arc<dyn CompletionProvider>,
        structured: Arc<dyn StructuredBackend>,
    ) -> Orchestrator {
        Orchestrator::new(index, llm, structured, 4, 5)
    }

    #[tokio::test]
    async fn test_structured_route_returns_backend_text() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![ROUTE_SQL]));
        let structured = Arc::new(FakeStructured::answering("There are 7 open tickets."));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            structured.clone(),
        );

        let answer = orchestrator.query("How many open tickets are there?", &[]).await;

        assert_eq!(answer, "There are 7 open tickets.");
        assert_eq!(llm.calls(), 1);
        assert_eq!(structured.calls(), 1);
    }

    #[tokio::test]
    async fn test_structured_failure_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![ROUTE_SQL]));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm,
            Arc::new(FakeStructured::failing("db down")),
        );

        let answer = orchestrator.query("List premium customers", &[]).await;
        assert_eq!(answer, "Structured query error: API error: db down");
    }

    #[tokio::test]
    async fn test_retrieval_route_cites_context() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![
            ROUTE_RAG,
            "Refunds take 5-7 days [Source: refund.pdf, Page 1]",
        ]));
        let structured = Arc::new(FakeStructured::answering("unused"));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            structured.clone(),
        );

        let answer = orchestrator.query("How long does a refund take?", &[]).await;

        assert_eq!(answer, "Refunds take 5-7 days [Source: refund.pdf, Page 1]");
        assert!(llm.system_prompt(1).contains("Source: refund.pdf, Page: 1"));
        assert_eq!(structured.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_index_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = VectorIndex::open(dir.path(), DistanceMetric::L2, embedder).unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![ROUTE_RAG]));
        let orchestrator = orchestrator(
            Arc::new(index),
            llm.clone(),
            Arc::new(FakeStructured::answering("unused")),
        );

        assert_eq!(orchestrator.query("refund policy?", &[]).await, NO_RELEVANT_INFORMATION);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_malformed_route_defaults_to_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec!["no idea", "Refunds take 5-7 days."]));
        let structured = Arc::new(FakeStructured::answering("unused"));
        let orchestrator = orchestrator(refund_index(dir.path()).await, llm, structured.clone());

        assert_eq!(orchestrator.query("refund?", &[]).await, "Refunds take 5-7 days.");
        assert_eq!(structured.calls(), 0);
    }

    #[tokio::test]
    async fn test_both_route_synthesizes() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![
            ROUTE_BOTH,
            "Refunds take 5-7 days.",
            "Emma has two tickets and her refund arrives within a week.",
        ]));
        let structured = Arc::new(FakeStructured::answering("Emma has two tickets."));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            structured.clone(),
        );

        let answer = orchestrator.query("Show Emma's tickets and refund timing", &[]).await;

        assert_eq!(answer, "Emma has two tickets and her refund arrives within a week.");
        assert_eq!(structured.calls(), 1);
        let synthesis_prompt = &llm.messages(2)[0].content;
        assert!(synthesis_prompt.contains("Emma has two tickets."));
        assert!(synthesis_prompt.contains("Refunds take 5-7 days."));
    }

    #[tokio::test]
    async fn test_both_route_synthesis_failure_concatenates() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![ROUTE_BOTH, "Refunds take 5-7 days."]));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm,
            Arc::new(FakeStructured::answering("Emma has two tickets.")),
        );

        let answer = orchestrator.query("Emma's tickets and refunds", &[]).await;
        assert_eq!(answer, "Emma has two tickets.\n\nRefunds take 5-7 days.");
    }

    #[tokio::test]
    async fn test_both_route_one_failure_is_inline() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![
            ROUTE_BOTH,
            "Refunds take 5-7 days.",
            "combined",
        ]));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            Arc::new(FakeStructured::failing("db down")),
        );

        assert_eq!(orchestrator.query("Emma's tickets and refunds", &[]).await, "combined");
        assert!(llm.messages(2)[0].content.contains("Structured query error: API error: db down"));
    }

    #[tokio::test]
    async fn test_both_route_double_failure_is_pipeline_error() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::from_results(vec![
            Ok(ROUTE_BOTH.to_string()),
            Err(ProviderError::Timeout),
        ]));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            Arc::new(FakeStructured::failing("db down")),
        );

        let answer = orchestrator.query("Emma's tickets and refunds", &[]).await;
        assert!(answer.starts_with("Error: Both backends failed"), "{}", answer);
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_query_makes_no_calls() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![]));
        let structured = Arc::new(FakeStructured::answering("unused"));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            structured.clone(),
        );

        assert_eq!(orchestrator.query("   ", &[]).await, "Error: Query is empty");
        assert_eq!(llm.calls(), 0);
        assert_eq!(structured.calls(), 0);
    }

    #[tokio::test]
    async fn test_history_reaches_retrieval_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedCompletion::new(vec![ROUTE_RAG, "ok"]));
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            llm.clone(),
            Arc::new(FakeStructured::answering("unused")),
        );
        let history = vec![
            ChatMessage::user("I returned a lamp"),
            ChatMessage::assistant("Noted."),
        ];

        orchestrator.query("When is my refund?", &history).await;

        let messages = llm.messages(1);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "I returned a lamp");
    }

    #[tokio::test]
    async fn test_admin_operations() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            Arc::new(ScriptedCompletion::new(vec![])),
            Arc::new(FakeStructured::answering("unused")),
        );

        let sources = orchestrator.retrieve_sources("How long does a refund take?").await;
        assert_eq!(sources[0].source, "refund.pdf");

        let stats = orchestrator.stats().await;
        assert_eq!(stats.index.total_documents, 1);
        assert_eq!(stats.structured["tickets"], 30);

        let outcome = orchestrator.delete_by_source("refund.pdf").await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(orchestrator.list_sources().is_empty());

        let again = orchestrator.delete_by_source("refund.pdf").await;
        assert!(!again.success);
        assert!(again.message.contains("No documents found"));
    }

    #[tokio::test]
    async fn test_clear_collection() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(
            refund_index(dir.path()).await,
            Arc::new(ScriptedCompletion::new(vec![])),
            Arc::new(FakeStructured::answering("unused")),
        );

        let outcome = orchestrator.clear_collection().await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.message, "Cleared 1 chunks from the collection");
        assert_eq!(orchestrator.stats().await.index.total_documents, 0);
    }
}
