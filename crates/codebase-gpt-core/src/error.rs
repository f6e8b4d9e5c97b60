//! Errors surfaced to the user by session actions.

use std::fmt;

use codebase_gpt_index::IndexError;
use codebase_gpt_llm::LlmError;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Missing or malformed user input.
    #[error("{0}")]
    Input(String),

    /// Action not allowed in the current phase.
    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("completion failed: {0}")]
    Completion(#[source] LlmError),
}

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    CloneError,
    ExtractionError,
    EmbeddingError,
    VectorStoreError,
    CompletionError,
    InputError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CloneError => "CloneError",
            Self::ExtractionError => "ExtractionError",
            Self::EmbeddingError => "EmbeddingError",
            Self::VectorStoreError => "VectorStoreError",
            Self::CompletionError => "CompletionError",
            Self::InputError => "InputError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) | Self::InvalidState(_) => ErrorKind::InputError,
            Self::Completion(_) => ErrorKind::CompletionError,
            Self::Index(e) => match e {
                IndexError::Clone(_) => ErrorKind::CloneError,
                IndexError::Extraction(_) => ErrorKind::ExtractionError,
                IndexError::Embedding(_) | IndexError::EmbeddingCountMismatch { .. } => {
                    ErrorKind::EmbeddingError
                }
                IndexError::VectorStore(_) => ErrorKind::VectorStoreError,
                IndexError::Config(_) => ErrorKind::InputError,
            },
        }
    }
}
