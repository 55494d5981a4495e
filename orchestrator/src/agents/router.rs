// Router Agent: classifies a query as structured-data, policy-retrieval, or both

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::metrics;
use crate::models::{AgentKind, ChatMessage, Confidence, RouteDecision};
use crate::providers::CompletionProvider;

const ROUTER_PROMPT: &str = r#"You are a routing agent that classifies user queries for a customer support system.

Your job is to determine which agent should handle each query:

1. SQL_AGENT: For queries about customer data, support tickets, account information
   Examples:
   - "Show me customer John's profile"
   - "How many open tickets are there?"
   - "List all premium customers"
   - "What tickets does customer X have?"

2. RAG_AGENT: For queries about company policies, procedures, refunds, terms
   Examples:
   - "What is the refund policy?"
   - "How do I cancel my subscription?"
   - "What information do you collect?"
   - "What are the terms of service?"

3. BOTH: When query needs information from both database AND policy documents
   Examples:
   - "Show me Emma's tickets and check if she's eligible for refund"
   - "List VIP customers and their refund policy"

Respond with JSON only:
{
  "agent": "SQL_AGENT" | "RAG_AGENT" | "BOTH",
  "reasoning": "brief explanation",
  "confidence": "high" | "medium" | "low"
}"#;

#[derive(Debug, Deserialize)]
struct RawDecision {
    agent: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<String>,
}

pub struct RouterAgent {
    llm: Arc<dyn CompletionProvider>,
}

impl RouterAgent {
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }

    /// Never fails: provider errors and unusable classifier output degrade to
    /// a low-confidence retrieval decision.
    pub async fn route(&self, query: &str) -> RouteDecision {
        info!("Router: classifying query");

        let content = match self.llm.complete(ROUTER_PROMPT, &[ChatMessage::user(query)]).await {
            Ok(content) => content,
            Err(e) => {
                metrics::provider_failure("router");
                warn!(error = %e, "routing call failed");
                return RouteDecision::fallback(format!(
                    "Default to retrieval due to routing error: {}",
                    e
                ));
            }
        };

        match parse_decision(&content) {
            Ok(decision) => {
                info!(
                    agent = decision.agent.as_str(),
                    confidence = ?decision.confidence,
                    "Router: decision made"
                );
                decision
            }
            Err(reason) => {
                warn!(reason = %reason, "unusable routing output");
                RouteDecision::fallback(format!(
                    "Default to retrieval due to routing error: {}",
                    reason
                ))
            }
        }
    }
}

/// Removes an optional ```json fence around the payload.
fn strip_code_fence(content: &str) -> &str {
    let mut body = content.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

fn parse_decision(content: &str) -> Result<RouteDecision, String> {
    let raw: RawDecision = serde_json::from_str(strip_code_fence(content))
        .map_err(|e| format!("malformed classifier output: {}", e))?;

    let agent = AgentKind::from_label(&raw.agent)
        .ok_or_else(|| format!("unrecognized agent label '{}'", raw.agent))?;
    let confidence = raw
        .confidence
        .as_deref()
        .and_then(Confidence::from_label)
        .unwrap_or(Confidence::Low);

    Ok(RouteDecision { agent, reasoning: raw.reasoning, confidence })
}
