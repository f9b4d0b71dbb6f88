//! The clustering pipeline: candidate-k search, final partition,
//! representative selection, naming, report assembly.

use super::kmeans::{kmeans, squared_euclidean};
use super::naming::cluster_name;
use super::silhouette::silhouette_score;
use super::ClusterError;
use crate::documents::Document;
use crate::semantic::{normalize_vector, sanitize_vector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fixed seed for every k-means run. Clustering must be reproducible: the
/// same embeddings and parameters always yield the same partition.
const CLUSTER_SEED: u64 = 42;

/// Parameters for a clustering run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterRequest {
    /// Pin the cluster count instead of searching for it.
    /// Clamped to `[1, total_documents - 1]`.
    pub num_clusters: Option<usize>,

    /// Lower bound of the cluster-count search range.
    pub min_clusters: usize,

    /// Upper bound of the cluster-count search range.
    pub max_clusters: usize,
}

impl Default for ClusterRequest {
    fn default() -> Self {
        Self {
            num_clusters: None,
            min_clusters: 2,
            max_clusters: 10,
        }
    }
}

/// One cluster in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    /// 1-based cluster id, unique within a report.
    pub cluster_id: usize,

    /// Derived name: tag consensus, else the representative's title.
    pub name: String,

    pub size: usize,

    /// Member document ids in the vector index's internal order.
    pub document_ids: Vec<u64>,

    /// Member whose embedding lies nearest the cluster centroid.
    pub representative_id: u64,
}

/// Result of a clustering run. Ephemeral: recomputed on demand, never
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<Cluster>,

    /// The chosen cluster count.
    pub num_clusters: usize,

    /// Silhouette score of the final partition (higher is better).
    pub quality_score: f32,

    pub total_documents: usize,
}

/// Cluster `embeddings` and assemble a report.
///
/// `embeddings` is the full `(id, vector)` snapshot from the vector index in
/// its internal order; `documents` resolves ids for naming. Ids missing from
/// `documents` still cluster, they just cannot contribute tags or titles.
pub fn compute_clusters(
    documents: &[Document],
    embeddings: Vec<(u64, Vec<f32>)>,
    request: &ClusterRequest,
) -> Result<ClusterReport, ClusterError> {
    if embeddings.len() < 2 {
        return Err(ClusterError::TooFewDocuments(embeddings.len()));
    }

    let (ids, mut vectors): (Vec<u64>, Vec<Vec<f32>>) = embeddings.into_iter().unzip();
    for vector in vectors.iter_mut() {
        sanitize_vector(vector);
        normalize_vector(vector);
    }

    let n = vectors.len();
    let chosen_k = match request.num_clusters {
        Some(k) => k.clamp(1, n - 1),
        None => search_cluster_count(&vectors, request.min_clusters, request.max_clusters),
    };

    let result = kmeans(&vectors, chosen_k, CLUSTER_SEED)?;
    let quality_score = silhouette_score(&vectors, &result.assignments, chosen_k);

    let by_id: HashMap<u64, &Document> = documents.iter().map(|d| (d.id, d)).collect();

    let mut clusters = Vec::with_capacity(chosen_k);
    for cluster_idx in 0..chosen_k {
        let positions: Vec<usize> = (0..n)
            .filter(|&i| result.assignments[i] == cluster_idx)
            .collect();
        if positions.is_empty() {
            continue;
        }

        let representative_id = representative(&vectors, &positions, &ids);

        let document_ids: Vec<u64> = positions.iter().map(|&i| ids[i]).collect();
        let members: Vec<&Document> = document_ids
            .iter()
            .filter_map(|id| by_id.get(id).copied())
            .collect();

        let name = cluster_name(&members, representative_id);

        clusters.push(Cluster {
            cluster_id: clusters.len() + 1,
            name,
            size: document_ids.len(),
            document_ids,
            representative_id,
        });
    }

    Ok(ClusterReport {
        clusters,
        num_clusters: chosen_k,
        quality_score,
        total_documents: n,
    })
}

/// Evaluate every candidate `k` and keep the best silhouette score.
/// Candidates are clamped to `[1, n-1]`; score ties go to the smaller `k`.
fn search_cluster_count(vectors: &[Vec<f32>], min_clusters: usize, max_clusters: usize) -> usize {
    let n = vectors.len();
    let lo = min_clusters.clamp(1, n - 1);
    let hi = max_clusters.clamp(lo, n - 1);

    let scored: Vec<(usize, f32)> = (lo..=hi)
        .into_par_iter()
        .map(|k| {
            let score = kmeans(vectors, k, CLUSTER_SEED)
                .map(|result| silhouette_score(vectors, &result.assignments, k))
                .unwrap_or(f32::NEG_INFINITY);
            (k, score)
        })
        .collect();

    let mut best_k = lo;
    let mut best_score = f32::NEG_INFINITY;
    for (k, score) in scored {
        if score > best_score {
            best_score = score;
            best_k = k;
        }
    }

    best_k
}

/// Member nearest the cluster centroid by Euclidean distance; ties go to the
/// earliest position in the index's internal order.
fn representative(vectors: &[Vec<f32>], positions: &[usize], ids: &[u64]) -> u64 {
    let dimension = vectors[0].len();
    let mut centroid = vec![0.0f32; dimension];
    for &position in positions {
        for (i, &value) in vectors[position].iter().enumerate() {
            centroid[i] += value;
        }
    }
    for value in centroid.iter_mut() {
        *value /= positions.len() as f32;
    }

    let mut best_position = positions[0];
    let mut best_distance = f32::INFINITY;
    for &position in positions {
        let distance = squared_euclidean(&vectors[position], &centroid);
        if distance < best_distance {
            best_distance = distance;
            best_position = position;
        }
    }

    ids[best_position]
}
