use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DistanceMetric, FlatIndex, IndexFile, IndexStorage, LoadOutcome};
use crate::error::IndexError;
use crate::metrics;
use crate::models::{
    AdminOutcome, ChunkMetadata, DocumentChunk, IndexStats, IndexedRecord, RetrievalResult,
    SourceSummary,
};
use crate::providers::{embed_or_skip, EmbeddingProvider};

pub const COLLECTION_NAME: &str = "policy_documents";

const EMBEDDER_CHECK_TEXT: &str = "How long does a refund take?";

/// Chunks embedded concurrently during ingestion.
const EMBED_CONCURRENCY: usize = 4;

/// A record on its way into the index. `vector: None` means embedding was
/// skipped and the record is dropped.
#[derive(Debug, Clone)]
pub struct PendingRecord {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone)]
struct Row {
    id: String,
    document: String,
    metadata: ChunkMetadata,
}

/// Immutable view of the index. Row `i` pairs with vector `i`.
#[derive(Debug, Clone)]
struct Snapshot {
    rows: Vec<Row>,
    vectors: FlatIndex,
}

impl Snapshot {
    fn empty(dims: usize, metric: DistanceMetric) -> Self {
        Self {
            rows: Vec::new(),
            vectors: FlatIndex::new(dims, metric),
        }
    }

    fn push(&mut self, id: String, vector: &[f32], document: String, metadata: ChunkMetadata) {
        self.vectors.add(vector);
        self.rows.push(Row { id, document, metadata });
    }

    fn contains(&self, id: &str) -> bool {
        self.rows.iter().any(|row| row.id == id)
    }

    fn records(&self) -> Vec<IndexedRecord> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| IndexedRecord {
                id: row.id.clone(),
                vector: self.vectors.vector(i).to_vec(),
                document: row.document.clone(),
                metadata: row.metadata.clone(),
            })
            .collect()
    }
}

/// Persistent exact k-NN index over document chunks.
///
/// Readers take a cheap `Arc` clone of the current snapshot and never block on
/// writers. Writers are serialized, build the next snapshot off to the side,
/// persist it, and only then swap it in.
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    metric: DistanceMetric,
    storage: IndexStorage,
    current: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
}

impl VectorIndex {
    /// Opens the index under `dir`, loading any persisted state.
    ///
    /// A missing or unreadable file yields an empty index. A file built with a
    /// different embedding model or dimension is refused.
    pub fn open(
        dir: impl Into<PathBuf>,
        metric: DistanceMetric,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, IndexError> {
        let storage = IndexStorage::new(dir);
        let dims = embedder.dimensions();
        let mut snapshot = Snapshot::empty(dims, metric);

        match storage.load() {
            LoadOutcome::Missing => {
                tracing::info!(
                    path = %storage.path().display(),
                    "no persisted index, starting empty"
                );
            }
            LoadOutcome::Corrupt(reason) => {
                tracing::warn!(
                    path = %storage.path().display(),
                    reason = %reason,
                    "persisted index unusable, starting empty"
                );
            }
            LoadOutcome::Loaded(file) => {
                if file.dimension != dims {
                    return Err(IndexError::DimensionMismatch {
                        expected: dims,
                        actual: file.dimension,
                    });
                }
                if file.embedding_model != embedder.model_name() {
                    return Err(IndexError::ModelMismatch {
                        indexed: file.embedding_model,
                        configured: embedder.model_name().to_string(),
                    });
                }
                if file.metric != metric {
                    tracing::warn!(
                        stored = %file.metric,
                        configured = %metric,
                        "distance metric changed, using configured metric"
                    );
                }

                let mut seen = HashSet::new();
                for record in file.records {
                    if !seen.insert(record.id.clone()) {
                        tracing::warn!(
                            id = %record.id,
                            "duplicate id in persisted index, keeping first"
                        );
                        continue;
                    }
                    snapshot.push(record.id, &record.vector, record.document, record.metadata);
                }
                tracing::info!(documents = snapshot.rows.len(), "loaded persisted index");
            }
        }

        metrics::set_index_documents(snapshot.rows.len());

        Ok(Self {
            embedder,
            metric,
            storage,
            current: RwLock::new(Arc::new(snapshot)),
            write_lock: Mutex::new(()),
        })
    }

    /// Embeds a fixed sentence and checks the provider returns vectors of the
    /// width it declares. An unreachable provider or a wrong width is fatal.
    pub async fn verify_embedder(&self) -> Result<(), IndexError> {
        let vector = self.embedder.embed(EMBEDDER_CHECK_TEXT).await?;
        let expected = self.dimension();
        if vector.len() != expected {
            return Err(IndexError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        tracing::info!(
            model = self.embedder.model_name(),
            dimensions = expected,
            "embedding provider verified"
        );
        Ok(())
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimensions()
    }

    pub fn len(&self) -> usize {
        self.snapshot().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    async fn commit(&self, next: Snapshot) -> Result<(), IndexError> {
        let file = IndexFile::new(
            self.dimension(),
            self.metric,
            self.embedder.model_name(),
            next.records(),
        );
        self.storage.save(&file).await?;

        let documents = next.rows.len();
        *self.current.write() = Arc::new(next);
        metrics::set_index_documents(documents);
        Ok(())
    }

    /// Appends records, returning how many were actually inserted.
    ///
    /// Records without a vector and ids already present are skipped. A vector
    /// of the wrong width rejects the whole batch before anything changes.
    pub async fn insert(&self, records: Vec<PendingRecord>) -> Result<usize, IndexError> {
        let dims = self.dimension();
        if let Some(bad) = records
            .iter()
            .filter_map(|r| r.vector.as_ref())
            .find(|v| v.len() != dims)
        {
            return Err(IndexError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            });
        }

        let _guard = self.write_lock.lock().await;
        let mut next = (*self.snapshot()).clone();
        let mut inserted = 0;

        for record in records {
            let Some(vector) = record.vector else {
                tracing::debug!(id = %record.id, "no embedding, skipping record");
                continue;
            };
            if next.contains(&record.id) {
                tracing::warn!(id = %record.id, "id already indexed, skipping record");
                continue;
            }
            next.push(record.id, &vector, record.document, record.metadata);
            inserted += 1;
        }

        if inserted == 0 {
            return Ok(0);
        }

        self.commit(next).await?;
        Ok(inserted)
    }

    /// Embeds and indexes chunks from the document processor.
    pub async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> AdminOutcome {
        let submitted = chunks.len();
        let embedder = self.embedder();

        let pending: Vec<PendingRecord> = futures::stream::iter(chunks)
            .map(|chunk| async move {
                let vector = embed_or_skip(embedder, &chunk.text).await;
                PendingRecord {
                    id: chunk.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string()),
                    vector,
                    metadata: chunk.metadata(),
                    document: chunk.text,
                }
            })
            .buffered(EMBED_CONCURRENCY)
            .collect()
            .await;

        match self.insert(pending).await {
            Ok(0) => AdminOutcome::failed("No valid documents to add after filtering"),
            Ok(inserted) => {
                tracing::info!(inserted, submitted, "documents added to index");
                AdminOutcome::ok(format!("Added {} of {} document chunks", inserted, submitted))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to add documents");
                AdminOutcome::failed(format!("Error adding documents: {}", e))
            }
        }
    }

    /// Up to `k` nearest records, ascending by distance.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievalResult> {
        let snapshot = self.snapshot();
        if query.len() != snapshot.vectors.dims() {
            tracing::warn!(
                expected = snapshot.vectors.dims(),
                actual = query.len(),
                "query vector has wrong dimension"
            );
            return Vec::new();
        }

        snapshot
            .vectors
            .search(query, k)
            .into_iter()
            .map(|(i, distance)| {
                let row = &snapshot.rows[i];
                RetrievalResult {
                    id: row.id.clone(),
                    document: row.document.clone(),
                    metadata: row.metadata.clone(),
                    distance,
                }
            })
            .collect()
    }

    /// Removes every record from `source`, rebuilding the vector array from the
    /// survivors. Returns the number removed; zero means no such source and
    /// nothing was touched.
    pub async fn delete_by_source(&self, source: &str) -> Result<usize, IndexError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();

        let removed = current.rows.iter().filter(|r| r.metadata.source == source).count();
        if removed == 0 {
            return Ok(0);
        }

        let mut next = Snapshot::empty(current.vectors.dims(), self.metric);
        for (i, row) in current.rows.iter().enumerate() {
            if row.metadata.source != source {
                next.push(
                    row.id.clone(),
                    current.vectors.vector(i),
                    row.document.clone(),
                    row.metadata.clone(),
                );
            }
        }

        self.commit(next).await?;
        tracing::info!(source, removed, "deleted source from index");
        Ok(removed)
    }

    /// Distinct sources with chunk counts, sorted by source name.
    pub fn list_sources(&self) -> Vec<SourceSummary> {
        let snapshot = self.snapshot();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for row in &snapshot.rows {
            *counts.entry(row.metadata.source.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .map(|(source, chunks)| SourceSummary {
                source: source.to_string(),
                chunks,
            })
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_documents: self.len(),
            collection_name: COLLECTION_NAME.to_string(),
        }
    }

    /// Drops every record and persists the empty index.
    pub async fn clear(&self) -> Result<(), IndexError> {
        let _guard = self.write_lock.lock().await;
        self.commit(Snapshot::empty(self.dimension(), self.metric)).await?;
        tracing::info!("index cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingEmbedder, HashEmbedder, MisreportingEmbedder};

    fn chunk(text: &str, source: &str, page: u32) -> DocumentChunk {
        DocumentChunk {
            text: text.to_string(),
            source: source.to_string(),
            page,
            chunk_index: 0,
            id: None,
        }
    }

    fn open(dir: &std::path::Path) -> VectorIndex {
        VectorIndex::open(dir, DistanceMetric::L2, Arc::new(HashEmbedder::new(32))).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());

        let outcome = index
            .add_documents(vec![
                chunk("refunds are processed in 5-7 days", "refund.pdf", 1),
                chunk("shipping takes two weeks overseas", "shipping.pdf", 3),
            ])
            .await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(index.len(), 2);

        let query = index.embedder().embed("how long do refunds take").await.unwrap();
        let hits = index.search(&query, 4);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.source, "refund.pdf");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_blank_chunks_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());

        let outcome = index
            .add_documents(vec![chunk("  ", "a.pdf", 1), chunk("real text", "a.pdf", 2)])
            .await;
        assert!(outcome.success);
        assert_eq!(index.len(), 1);

        let outcome = index.add_documents(vec![chunk("", "b.pdf", 1)]).await;
        assert!(!outcome.success);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failures_add_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let index =
            VectorIndex::open(dir.path(), DistanceMetric::L2, Arc::new(FailingEmbedder::new(32)))
                .unwrap();
        let outcome = index.add_documents(vec![chunk("refunds", "refund.pdf", 1)]).await;
        assert!(!outcome.success);
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let mut first = chunk("refunds", "refund.pdf", 1);
        first.id = Some("c0".to_string());
        let mut again = chunk("refunds again", "refund.pdf", 2);
        again.id = Some("c0".to_string());

        assert!(index.add_documents(vec![first]).await.success);
        assert!(!index.add_documents(vec![again]).await.success);
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejects_batch() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        let result = index
            .insert(vec![
                PendingRecord {
                    id: "ok".to_string(),
                    vector: Some(vec![0.0; 32]),
                    document: "fine".to_string(),
                    metadata: ChunkMetadata {
                        source: "a.pdf".to_string(),
                        page: 1,
                        chunk_index: 0,
                    },
                },
                PendingRecord {
                    id: "bad".to_string(),
                    vector: Some(vec![0.0; 3]),
                    document: "short".to_string(),
                    metadata: ChunkMetadata {
                        source: "a.pdf".to_string(),
                        page: 2,
                        chunk_index: 0,
                    },
                },
            ])
            .await;
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 32, actual: 3 })
        ));
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_verify_embedder_accepts_matching_width() {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path()).verify_embedder().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_embedder_rejects_misreported_width() {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::open(
            dir.path(),
            DistanceMetric::L2,
            Arc::new(MisreportingEmbedder::new(768, 16)),
        )
        .unwrap();
        assert!(matches!(
            index.verify_embedder().await,
            Err(IndexError::DimensionMismatch { expected: 768, actual: 16 })
        ));
    }

    #[tokio::test]
    async fn test_verify_embedder_rejects_unreachable_provider() {
        let dir = tempfile::tempdir().unwrap();
        let index =
            VectorIndex::open(dir.path(), DistanceMetric::L2, Arc::new(FailingEmbedder::new(32)))
                .unwrap();
        assert!(matches!(index.verify_embedder().await, Err(IndexError::Provider(_))));
    }

    #[tokio::test]
    async fn test_search_on_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        assert!(index.search(&[0.0; 32], 4).is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index
            .add_documents(vec![
                chunk("refund window is 30 days", "refund.pdf", 1),
                chunk("refund shipping costs", "refund.pdf", 2),
                chunk("warranty covers one year", "warranty.pdf", 1),
            ])
            .await;

        assert_eq!(index.delete_by_source("missing.pdf").await.unwrap(), 0);
        assert_eq!(index.len(), 3);

        assert_eq!(index.delete_by_source("refund.pdf").await.unwrap(), 2);
        assert_eq!(
            index.list_sources(),
            vec![SourceSummary { source: "warranty.pdf".to_string(), chunks: 1 }]
        );

        let query = index.embedder().embed("refund window").await.unwrap();
        let hits = index.search(&query, 4);
        assert!(hits.iter().all(|h| h.metadata.source != "refund.pdf"));
    }

    #[tokio::test]
    async fn test_reopen_restores_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let index = open(dir.path());
            index
                .add_documents(vec![
                    chunk("refunds", "refund.pdf", 1),
                    chunk("shipping", "shipping.pdf", 1),
                ])
                .await;
            index.delete_by_source("shipping.pdf").await.unwrap();
        }

        let reopened = open(dir.path());
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.list_sources()[0].source, "refund.pdf");
    }

    #[tokio::test]
    async fn test_model_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        open(dir.path())
            .add_documents(vec![chunk("refunds", "refund.pdf", 1)])
            .await;

        let other = HashEmbedder::with_model(32, "other-model");
        let result = VectorIndex::open(dir.path(), DistanceMetric::L2, Arc::new(other));
        assert!(matches!(result, Err(IndexError::ModelMismatch { .. })));

        let result =
            VectorIndex::open(dir.path(), DistanceMetric::L2, Arc::new(HashEmbedder::new(16)));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(super::super::INDEX_FILE), b"garbage").unwrap();
        let index = open(dir.path());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let index = open(dir.path());
        index.add_documents(vec![chunk("refunds", "refund.pdf", 1)]).await;

        let stats = index.stats();
        assert_eq!(stats.total_documents, 1);
        assert_eq!(stats.collection_name, "policy_documents");

        index.clear().await.unwrap();
        assert!(index.is_empty());
        assert!(open(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_readers_see_whole_snapshots_during_delete() {
        let dir = tempfile::tempdir().unwrap();
        let index = Arc::new(open(dir.path()));
        let chunks: Vec<DocumentChunk> = (0..20)
            .map(|i| chunk(&format!("refund clause {}", i), "refund.pdf", i))
            .chain((0..5).map(|i| chunk(&format!("warranty clause {}", i), "warranty.pdf", i)))
            .collect();
        index.add_documents(chunks).await;

        let query = index.embedder().embed("refund clause").await.unwrap();
        let reader = {
            let index = Arc::clone(&index);
            let query = query.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let hits = index.search(&query, 25);
                    let refunds = hits.iter().filter(|h| h.metadata.source == "refund.pdf").count();
                    assert!(refunds == 0 || refunds == 20, "saw partial delete: {}", refunds);
                    tokio::task::yield_now().await;
                }
            })
        };

        index.delete_by_source("refund.pdf").await.unwrap();
        reader.await.unwrap();
        assert_eq!(index.len(), 5);
    }
}
