// Retriever Agent: embeds the query and pulls the nearest policy chunks

use std::sync::Arc;

use tracing::info;

use crate::index::VectorIndex;
use crate::models::{RetrievalResult, SourcePreview};
use crate::providers::embed_or_skip;

const PREVIEW_CHARS: usize = 200;

pub struct RetrieverAgent {
    index: Arc<VectorIndex>,
    top_k: usize,
}

impl RetrieverAgent {
    pub fn new(index: Arc<VectorIndex>, top_k: usize) -> Self {
        Self { index, top_k }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Nearest chunks for `query`, or empty when the index has nothing to
    /// offer. `k` defaults to the configured top-k.
    pub async fn retrieve(&self, query: &str, k: Option<usize>) -> Vec<RetrievalResult> {
        if self.index.is_empty() {
            info!("Retriever: index is empty");
            return Vec::new();
        }

        // Same provider instance the index was built with.
        let Some(vector) = embed_or_skip(self.index.embedder(), query).await else {
            return Vec::new();
        };

        let results = self.index.search(&vector, k.unwrap_or(self.top_k));
        info!(hits = results.len(), "Retriever: search complete");
        results
    }

    /// Provenance-tagged context block, nearest first.
    pub fn format_context(results: &[RetrievalResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "[Document {}]\nSource: {}, Page: {}\n{}\n",
                    i + 1,
                    r.metadata.source,
                    r.metadata.page,
                    r.document
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Retrieval hits as previews, without generating an answer.
    pub async fn sources(&self, query: &str) -> Vec<SourcePreview> {
        self.retrieve(query, None)
            .await
            .into_iter()
            .map(|r| SourcePreview {
                source: r.metadata.source,
                page: r.metadata.page,
                preview: format!(
                    "{}...",
                    r.document.chars().take(PREVIEW_CHARS).collect::<String>()
                ),
            })
            .collect()
    }
}
