//! Semantic search infrastructure for document embeddings.
//!
//! Embeddings are generated locally with fastembed and held in an in-memory
//! vector index persisted to vectors.bin.
//!
//! # Architecture
//!
//! - `embeddings`: Wraps fastembed for embedding generation
//! - `index`: Insertion-ordered vector index with k-NN cosine-distance query
//! - `storage`: Binary file I/O for vectors.bin persistence
//! - `service`: Lazy-loaded shared state tying the three together

pub mod embeddings;
mod index;
mod service;
mod storage;

pub use embeddings::{EmbeddingError, EmbeddingModel};
pub use index::{normalize_vector, sanitize_vector, IndexError, VectorEntry, VectorIndex};
pub use service::{SemanticError, SemanticService};
pub use storage::{VectorStorage, VectorStorageError};

/// Default embedding model (384 dimensions, small and fast to download)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Hash of the text a document's embedding was computed from.
/// Used to decide whether an update actually needs a re-embed.
pub fn content_hash(content: &str) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("same text"), content_hash("same text"));
        assert_ne!(content_hash("one text"), content_hash("other text"));
    }
}
