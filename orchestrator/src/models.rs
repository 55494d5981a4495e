use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provenance attached to every indexed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    pub chunk_index: u32,
}

/// A chunk handed over by the document processor. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source: String,
    pub page: u32,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub id: Option<String>,
}

impl DocumentChunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            page: self.page,
            chunk_index: self.chunk_index,
        }
    }
}

/// Row owned by the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub document: String,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

/// Diagnostic view of a retrieval hit, no answer generation involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePreview {
    pub source: String,
    pub page: u32,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub collection_name: String,
}

/// Status report: index counts plus row counts from the structured store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    #[serde(flatten)]
    pub index: IndexStats,
    pub structured: BTreeMap<String, i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_error: Option<String>,
}

/// Result of an administrative operation. Callers branch on `success`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdminOutcome {
    pub success: bool,
    pub message: String,
}

impl AdminOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}

// Routing

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentKind {
    Structured,
    Retrieval,
    Both,
}

impl AgentKind {
    /// Strict allow-list over classifier labels. Anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SQL_AGENT" | "STRUCTURED" => Some(AgentKind::Structured),
            "RAG_AGENT" | "RETRIEVAL" => Some(AgentKind::Retrieval),
            "BOTH" => Some(AgentKind::Both),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Structured => "structured",
            AgentKind::Retrieval => "retrieval",
            AgentKind::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Confidence::High),
            "medium" => Some(Confidence::Medium),
            "low" => Some(Confidence::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub agent: AgentKind,
    pub reasoning: String,
    pub confidence: Confidence,
}

impl RouteDecision {
    /// Used whenever classification cannot be trusted.
    pub fn fallback(reasoning: impl Into<String>) -> Self {
        Self {
            agent: AgentKind::Retrieval,
            reasoning: reasoning.into(),
            confidence: Confidence::Low,
        }
    }
}

// Conversation

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Last `window` messages of the caller-owned history.
pub fn recent_history(history: &[ChatMessage], window: usize) -> &[ChatMessage] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

// API Request/Response models

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_history: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteSourceParams {
    pub source: String,
}
