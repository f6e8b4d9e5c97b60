//! Error types for codebase-gpt-index.

use std::path::PathBuf;

/// Failure to produce a local snapshot of a repository.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("invalid repository URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("failed to run {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git clone failed ({status}): {stderr}")]
    Failed { status: String, stderr: String },

    #[error("git clone timed out after {0}s")]
    Timeout(u64),

    #[error("clone workspace error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to walk a snapshot. Per-file problems are skipped, not reported here.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("snapshot root {path} is not readable: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extraction task failed: {0}")]
    Task(String),
}

/// Errors that can occur while analyzing a repository or retrieving from it.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error(transparent)]
    Clone(#[from] CloneError),

    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// Embedding provider error.
    #[error("embedding failed: {0}")]
    Embedding(#[source] codebase_gpt_llm::LlmError),

    #[error("vector store error: {0}")]
    VectorStore(#[from] codebase_gpt_store::VectorStoreError),

    #[error("embedding service returned {got} vectors for {expected} chunks")]
    EmbeddingCountMismatch { expected: usize, got: usize },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
