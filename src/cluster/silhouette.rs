//! Silhouette coefficient for scoring a partition.
//!
//! For each point: `a` is its mean distance to its own cluster's other
//! members, `b` the smallest mean distance to any other cluster, and the
//! point's score is `(b - a) / max(a, b)`. The partition score is the mean
//! over all points, in [-1, 1], higher is better. Euclidean distance, which
//! on normalized embeddings ranks like cosine.
//!
//! Degenerate partitions are defined rather than rejected: a single cluster
//! scores 0, and a singleton cluster contributes 0 for its lone member.

use rayon::prelude::*;

pub fn silhouette_score(vectors: &[Vec<f32>], assignments: &[usize], k: usize) -> f32 {
    let n = vectors.len();
    if k < 2 || n < 2 {
        return 0.0;
    }

    let mut sizes = vec![0usize; k];
    for &cluster in assignments {
        sizes[cluster] += 1;
    }

    // per-point scores computed in parallel, reduced sequentially so the
    // float sum is identical run to run
    let scores: Vec<f32> = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = assignments[i];
            if sizes[own] <= 1 {
                return 0.0;
            }

            // mean distance from point i to every cluster
            let mut sums = vec![0.0f32; k];
            for j in 0..n {
                if i == j {
                    continue;
                }
                sums[assignments[j]] += euclidean(&vectors[i], &vectors[j]);
            }

            let a = sums[own] / (sizes[own] - 1) as f32;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f32)
                .fold(f32::INFINITY, f32::min);

            if !b.is_finite() {
                // no other populated cluster to compare against
                return 0.0;
            }

            let denom = a.max(b);
            if denom < f32::EPSILON {
                0.0
            } else {
                (b - a) / denom
            }
        })
        .collect();

    scores.iter().sum::<f32>() / n as f32
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    super::kmeans::squared_euclidean(a, b).sqrt()
}
