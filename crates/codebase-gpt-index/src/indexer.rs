//! Embed chunks and upsert them under a repository namespace.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use codebase_gpt_llm::{AnyProvider, LlmError, LlmProvider};
use codebase_gpt_store::{VectorFilter, VectorPoint, VectorStore};
use serde::{Deserialize, Serialize};

use crate::NAMESPACE_FIELD;
use crate::chunker::Chunk;
use crate::error::{IndexError, Result};

/// What to do with documents already stored under a namespace being analyzed again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReindexMode {
    /// Keep them; the namespace ends up with duplicate documents.
    #[default]
    Append,
    /// Delete them before upserting the new batch.
    ///
    /// The delete is not undone when the upsert fails, so a failed run leaves the
    /// namespace empty until the repository is analyzed again.
    Replace,
}

impl std::str::FromStr for ReindexMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            other => Err(format!("unknown reindex mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub collection: String,
    pub reindex: ReindexMode,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            collection: "codebase-rag".into(),
            reindex: ReindexMode::default(),
        }
    }
}

/// Summary of one analysis run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub files_indexed: usize,
    pub chunks_created: usize,
    pub documents_upserted: usize,
    /// Documents already under the namespace before this run.
    pub previously_indexed: u64,
    /// Whether those documents were deleted first.
    pub replaced: bool,
    pub duration_ms: u64,
}

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    provider: Arc<AnyProvider>,
    config: IndexerConfig,
}

impl Indexer {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, provider: Arc<AnyProvider>, config: IndexerConfig) -> Self {
        Self {
            store,
            provider,
            config,
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    /// Embed every chunk and upsert all of them under `namespace` in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] if the embedding service fails and
    /// [`IndexError::VectorStore`] if the collection setup or upsert fails.
    pub async fn index(&self, namespace: &str, chunks: Vec<Chunk>) -> Result<IndexReport> {
        let start = std::time::Instant::now();
        let mut report = IndexReport {
            files_indexed: chunks
                .iter()
                .map(|c| c.source.as_str())
                .collect::<HashSet<_>>()
                .len(),
            chunks_created: chunks.len(),
            ..IndexReport::default()
        };

        if chunks.is_empty() {
            tracing::warn!(namespace, "no chunks to index");
            return Ok(report);
        }

        tracing::info!(namespace, chunks = chunks.len(), "embedding chunks");
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .provider
            .embed_batch(&texts)
            .await
            .map_err(IndexError::Embedding)?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::EmbeddingCountMismatch {
                expected: chunks.len(),
                got: vectors.len(),
            });
        }
        let vector_size = vectors.first().map_or(0, Vec::len);
        if vector_size == 0 {
            return Err(IndexError::Embedding(LlmError::Other(format!(
                "{} returned empty vectors",
                self.provider.name()
            ))));
        }

        let collection = self.config.collection.as_str();
        self.store
            .ensure_collection(collection, vector_size as u64)
            .await?;

        let filter = VectorFilter::text_eq(NAMESPACE_FIELD, namespace);
        report.previously_indexed = self.store.count(collection, Some(filter.clone())).await?;
        if report.previously_indexed > 0 {
            match self.config.reindex {
                ReindexMode::Replace => {
                    self.store.delete_by_filter(collection, filter).await?;
                    report.replaced = true;
                    tracing::info!(
                        namespace,
                        removed = report.previously_indexed,
                        "replaced existing documents"
                    );
                }
                ReindexMode::Append => {
                    tracing::warn!(
                        namespace,
                        existing = report.previously_indexed,
                        "namespace already indexed, appending duplicate documents"
                    );
                }
            }
        }

        let points: Vec<VectorPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| to_point(namespace, chunk, vector))
            .collect();
        report.documents_upserted = points.len();
        self.store.upsert(collection, points).await?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        tracing::info!(
            namespace,
            files = report.files_indexed,
            documents = report.documents_upserted,
            duration_ms = report.duration_ms,
            "indexing finished"
        );
        Ok(report)
    }

    /// Number of documents stored under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::VectorStore`] if the store cannot be queried.
    pub async fn document_count(&self, namespace: &str) -> Result<u64> {
        let filter = VectorFilter::text_eq(NAMESPACE_FIELD, namespace);
        Ok(self
            .store
            .count(&self.config.collection, Some(filter))
            .await?)
    }
}

fn to_point(namespace: &str, chunk: Chunk, vector: Vec<f32>) -> VectorPoint {
    let mut payload = HashMap::new();
    payload.insert(NAMESPACE_FIELD.to_owned(), serde_json::json!(namespace));
    payload.insert("source".to_owned(), serde_json::json!(chunk.source));
    payload.insert("chunk_id".to_owned(), serde_json::json!(chunk.index));
    payload.insert("text".to_owned(), serde_json::json!(chunk.text));
    payload.insert("content".to_owned(), serde_json::Value::String(chunk.text));
    VectorPoint {
        id: uuid::Uuid::new_v4().to_string(),
        vector,
        payload,
    }
}
