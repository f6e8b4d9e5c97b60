//! Vector storage abstraction with Qdrant and in-memory backends.

pub mod in_memory_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use in_memory_store::InMemoryVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{
    KeywordMatch, ScoredVectorPoint, VectorFilter, VectorPoint, VectorStore, VectorStoreError,
};
