use crate::cluster::ClusterError;
use crate::semantic::{EmbeddingError, SemanticError};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("document {0} not found")]
    NotFound(u64),

    #[error("k must be at least 1")]
    InvalidK,

    #[error("ordinal index {n} out of range (1..={count})")]
    OrdinalOutOfRange { n: usize, count: usize },

    #[error("clustering failed: {0}")]
    Cluster(#[from] ClusterError),

    /// The embedding model could not be loaded. Surfaced separately from
    /// other semantic failures so callers can degrade gracefully: listing,
    /// ordinals and deletes keep working without the model.
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(#[source] EmbeddingError),

    #[error("semantic error: {0}")]
    Semantic(SemanticError),

    /// A dual-store mutation failed after one side was applied and the
    /// rollback of that side failed too. The divergence is visible through
    /// the consistency check.
    #[error("partial write, ledger and vector index may disagree: {0}")]
    PartialWrite(String),

    #[error("ledger error: {0:?}")]
    Ledger(#[from] anyhow::Error),
}

impl From<SemanticError> for StoreError {
    fn from(err: SemanticError) -> Self {
        match err {
            SemanticError::ModelUnavailable(inner) => StoreError::ModelUnavailable(inner),
            other => StoreError::Semantic(other),
        }
    }
}
