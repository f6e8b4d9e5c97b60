//! Namespace-scoped similarity search and prompt context rendering.

use std::fmt::Write;
use std::sync::Arc;

use codebase_gpt_llm::{AnyProvider, LlmProvider};
use codebase_gpt_store::{ScoredVectorPoint, VectorFilter, VectorStore};
use serde::{Deserialize, Serialize};

use crate::NAMESPACE_FIELD;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: u64,
    /// Minimum cosine similarity to accept. `None` keeps every hit.
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            score_threshold: None,
        }
    }
}

/// One stored document returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub source: String,
    pub chunk_index: u64,
    pub text: String,
    pub score: f32,
}

pub struct Retriever {
    store: Arc<dyn VectorStore>,
    provider: Arc<AnyProvider>,
    collection: String,
    config: RetrievalConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        provider: Arc<AnyProvider>,
        collection: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            provider,
            collection: collection.into(),
            config,
        }
    }

    /// Top-k documents under `namespace` most similar to `question`, best first.
    ///
    /// An absent collection yields an empty result.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] if the question cannot be embedded and
    /// [`IndexError::VectorStore`] if the search fails.
    pub async fn retrieve(&self, namespace: &str, question: &str) -> Result<Vec<RetrievedChunk>> {
        if !self.store.collection_exists(&self.collection).await? {
            tracing::debug!(collection = %self.collection, "collection missing, nothing to retrieve");
            return Ok(Vec::new());
        }

        let vector = self
            .provider
            .embed(question)
            .await
            .map_err(IndexError::Embedding)?;

        let hits = self
            .store
            .search(
                &self.collection,
                vector,
                self.config.top_k,
                Some(VectorFilter::text_eq(NAMESPACE_FIELD, namespace)),
            )
            .await?;

        let threshold = self.config.score_threshold.unwrap_or(f32::NEG_INFINITY);
        let chunks: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter(|h| h.score >= threshold)
            .filter_map(hit_to_chunk)
            .collect();

        tracing::debug!(namespace, hits = chunks.len(), "retrieved context");
        Ok(chunks)
    }
}

fn hit_to_chunk(hit: ScoredVectorPoint) -> Option<RetrievedChunk> {
    let text = hit
        .payload
        .get("text")
        .or_else(|| hit.payload.get("content"))
        .and_then(serde_json::Value::as_str)?
        .to_owned();
    let source = hit
        .payload
        .get("source")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown")
        .to_owned();
    let chunk_index = hit
        .payload
        .get("chunk_id")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or(0);
    Some(RetrievedChunk {
        source,
        chunk_index,
        text,
        score: hit.score,
    })
}

/// Render retrieved chunks as a prompt block. Empty input renders as an empty string.
#[must_use]
pub fn format_as_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut out = String::from("<code_context>\n");
    for chunk in chunks {
        let _ = writeln!(
            out,
            "  <chunk source=\"{}\" chunk=\"{}\" score=\"{:.2}\">",
            chunk.source, chunk.chunk_index, chunk.score,
        );
        out.push_str(&chunk.text);
        out.push_str("\n  </chunk>\n");
    }
    out.push_str("</code_context>");
    out
}
