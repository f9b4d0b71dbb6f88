//! Document clustering over the embedding set.
//!
//! A seeded k-means partitions the sanitized, normalized embeddings; the
//! cluster count is chosen by silhouette score over a candidate range unless
//! the caller pins it. Each cluster gets a representative document (member
//! nearest its centroid) and a name derived from tag consensus, falling back
//! to the representative's title.
//!
//! # Modules
//!
//! - `kmeans`: seeded k-means with k-means++ initialization
//! - `silhouette`: partition quality score (higher is better)
//! - `naming`: tag-consensus cluster naming
//! - `engine`: the full pipeline and report types
//! - `cache`: memoization of the last report, invalidated on any mutation

pub mod cache;
mod engine;
mod kmeans;
mod naming;
mod silhouette;

pub use cache::ClusterCache;
pub use engine::{compute_clusters, Cluster, ClusterReport, ClusterRequest};

/// Errors that can occur during clustering operations.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("need at least 2 documents to cluster, have {0}")]
    TooFewDocuments(usize),

    #[error("invalid cluster count {k} for {vectors} vectors")]
    InvalidClusterCount { k: usize, vectors: usize },

    #[error("embedding dimension mismatch in clustering input")]
    DimensionMismatch,

    #[error("no vectors available for clustering")]
    EmptyVectorSet,
}
