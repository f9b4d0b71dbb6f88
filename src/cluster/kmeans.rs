//! Seeded k-means over embedding vectors.
//!
//! Inputs are expected to be sanitized and L2-normalized by the engine.
//! Assignment uses squared Euclidean distance; with normalized inputs this
//! ranks identically to cosine distance. Initialization is k-means++ driven
//! by a caller-supplied seed, which makes every run reproducible.

use super::ClusterError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum number of iterations before giving up on convergence.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid movement between iterations.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of a k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// One centroid per cluster, same dimension as the input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster index in `0..k` for each input vector.
    pub assignments: Vec<usize>,

    /// Iterations until convergence (or the cap).
    pub iterations: usize,
}

/// Partition `vectors` into `k` clusters.
///
/// Deterministic: the same vectors, `k` and `seed` always produce the same
/// partition.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, seed: u64) -> Result<KMeansResult, ClusterError> {
    if vectors.is_empty() {
        return Err(ClusterError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusterError::InvalidClusterCount {
            k,
            vectors: vectors.len(),
        });
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusterError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut centroids = init_centroids(vectors, k, &mut rng);
    let mut assignments = vec![0usize; vectors.len()];
    let mut iterations = 0;

    loop {
        iterations += 1;

        let new_assignments: Vec<usize> = vectors
            .iter()
            .map(|vector| nearest_centroid(vector, &centroids))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged || iterations >= MAX_ITERATIONS {
            break;
        }

        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);

        let movement = centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        if movement < CONVERGENCE_TOLERANCE {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        log::warn!("k-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Index of the centroid nearest to `vector`. Ties go to the lower index.
fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best_distance = f32::INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_euclidean(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_cluster = i;
        }
    }

    best_cluster
}

pub(super) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum()
}

/// Recompute centroids as the mean of each cluster's members.
/// An emptied cluster is re-seeded from an rng-chosen input vector.
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut centroids = vec![vec![0.0; dimension]; k];
    let mut sizes = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        for (i, &value) in vector.iter().enumerate() {
            centroids[cluster][i] += value;
        }
        sizes[cluster] += 1;
    }

    for (centroid, &size) in centroids.iter_mut().zip(sizes.iter()) {
        if size == 0 {
            *centroid = vectors[rng.random_range(0..vectors.len())].clone();
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
        }
    }

    centroids
}

/// k-means++ seeding: pick the first centroid at random, then each next one
/// with probability proportional to its squared distance from the nearest
/// already-chosen centroid.
fn init_centroids(vectors: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);

    let first = rng.random_range(0..vectors.len());
    centroids.push(vectors[first].clone());

    while centroids.len() < k {
        let mut distances = Vec::with_capacity(vectors.len());
        let mut total = 0.0f32;

        for vector in vectors {
            let nearest = centroids
                .iter()
                .map(|centroid| squared_euclidean(vector, centroid))
                .fold(f32::INFINITY, f32::min);
            distances.push(nearest);
            total += nearest;
        }

        if total < EPSILON {
            // every point coincides with a centroid; duplicate it and let
            // empty clusters shake out in the update step
            let reuse = centroids[0].clone();
            centroids.push(reuse);
            continue;
        }

        let target = rng.random::<f32>() * total;
        let mut cumulative = 0.0;
        let mut chosen = vectors.len() - 1;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target {
                chosen = i;
                break;
            }
        }

        centroids.push(vectors[chosen].clone());
    }

    centroids
}

/// Mean squared movement between two centroid sets.
fn centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(a, b)| squared_euclidean(a, b))
        .sum::<f32>()
        / old.len() as f32
}
