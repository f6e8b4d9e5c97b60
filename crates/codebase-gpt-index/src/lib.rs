//! Repository indexing pipeline and namespace-scoped retrieval.
//!
//! A repository URL is shallow-cloned into a temporary directory, its
//! source-like files are extracted and split into overlapping character
//! windows, and every window is embedded and upserted into a shared vector
//! collection under a namespace equal to the URL. Retrieval embeds a question
//! and searches only within that namespace.

pub mod chunker;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod indexer;
pub mod retriever;

pub use error::{CloneError, ExtractError, IndexError, Result};

/// Payload key holding the repository URL of an indexed document.
pub const NAMESPACE_FIELD: &str = "namespace";
