//! Personal document store with semantic search and clustering.
//!
//! Documents are embedded with a local sentence-transformer model (fastembed),
//! stored in a vector index kept in lockstep with a CSV-backed document
//! ledger, and retrieved by nearest-neighbor similarity search. A cluster
//! engine groups documents by embedding similarity, picks a representative
//! document per group, and names groups from tag consensus.
//!
//! The crate is the in-process core; HTTP and CLI surfaces live elsewhere and
//! talk to [`DocumentStore`].

pub mod cluster;
pub mod config;
pub mod documents;
pub mod semantic;
pub mod storage;
pub mod store;
#[cfg(test)]
mod tests;

pub use cluster::{Cluster, ClusterReport, ClusterRequest};
pub use config::Config;
pub use documents::{Document, DocumentCreate, DocumentUpdate};
pub use store::{ConsistencyReport, DocumentStore, SearchResult, StoreError, StoreStats};

/// Split a comma-separated tag string into normalized tags:
/// trimmed, lowercased, empties dropped, order-preserving dedup.
pub fn parse_tags(tags: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.split(',')
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}
