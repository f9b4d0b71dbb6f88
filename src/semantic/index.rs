//! Insertion-ordered vector index with k-nearest-neighbor query.
//!
//! Stores one embedding per document id. Queries rank by cosine distance,
//! ascending (most similar first). The insertion order is the index's
//! internal ordering: it breaks distance ties in queries and representative
//! selection, and it is the order `get_all` hands to the cluster engine.

use std::collections::HashMap;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// Document id the embedding belongs to
    pub id: u64,
    /// Hash of the content that was embedded
    pub content_hash: u64,
    /// The embedding vector
    pub embedding: Vec<f32>,
}

pub struct VectorIndex {
    /// Entries in insertion order
    entries: Vec<VectorEntry>,
    /// Document id -> position in `entries`
    by_id: HashMap<u64, usize>,
    /// Expected embedding dimensions
    dimensions: usize,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Vector for document {0} already present; update it instead")]
    DuplicateId(u64),

    #[error("No vector stored for document {0}")]
    IdNotFound(u64),

    #[error("Query k must be at least 1")]
    InvalidK,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            by_id: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            by_id: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&VectorEntry> {
        self.by_id.get(&id).map(|&idx| &self.entries[idx])
    }

    /// Document ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().map(|entry| entry.id)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &VectorEntry> {
        self.entries.iter()
    }

    /// Add a new embedding. Fails if an entry for `id` is already present.
    pub fn insert(
        &mut self,
        id: u64,
        content_hash: u64,
        mut embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;

        if self.by_id.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }

        sanitize_vector(&mut embedding);

        self.by_id.insert(id, self.entries.len());
        self.entries.push(VectorEntry {
            id,
            content_hash,
            embedding,
        });

        Ok(())
    }

    /// Replace the embedding for an existing entry. Fails if `id` is absent.
    /// The entry keeps its position in the internal ordering.
    pub fn update(
        &mut self,
        id: u64,
        content_hash: u64,
        mut embedding: Vec<f32>,
    ) -> Result<(), IndexError> {
        self.check_dimensions(&embedding)?;

        let &idx = self.by_id.get(&id).ok_or(IndexError::IdNotFound(id))?;

        sanitize_vector(&mut embedding);

        self.entries[idx].content_hash = content_hash;
        self.entries[idx].embedding = embedding;

        Ok(())
    }

    /// Remove an entry. Returns the removed entry, or `None` if `id` was
    /// not present.
    pub fn remove(&mut self, id: u64) -> Option<VectorEntry> {
        let idx = self.by_id.remove(&id)?;
        let entry = self.entries.remove(idx);

        for position in self.by_id.values_mut() {
            if *position > idx {
                *position -= 1;
            }
        }

        Some(entry)
    }

    /// Return up to `k` nearest neighbors as `(id, cosine distance)` pairs,
    /// ascending by distance. Distance ties keep insertion order.
    pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<(u64, f32)>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK);
        }
        self.check_dimensions(query)?;

        let query_norm = l2_norm(query);

        let mut results: Vec<(u64, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry.id, cosine_distance(query, &entry.embedding, query_norm)))
            .collect();

        results.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(k);

        Ok(results)
    }

    /// Every stored `(id, embedding)` pair in insertion order.
    /// Bulk retrieval path for the cluster engine.
    pub fn get_all(&self) -> Vec<(u64, Vec<f32>)> {
        self.entries
            .iter()
            .map(|entry| (entry.id, entry.embedding.clone()))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_id.clear();
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }
}

/// Replace non-finite components with 0 so distance math cannot overflow.
pub fn sanitize_vector(vector: &mut [f32]) {
    for value in vector.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
}

/// Scale to unit L2 norm. A zero-norm vector is left unchanged (treated as
/// having norm 1) rather than producing NaNs.
pub fn normalize_vector(vector: &mut [f32]) {
    let norm = l2_norm(vector);
    if norm < f32::EPSILON {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine distance in [0, 2]. A zero-norm side counts as maximally
/// dissimilar (similarity 0, distance 1).
fn cosine_distance(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if query_norm < f32::EPSILON || target_norm < f32::EPSILON {
        return 1.0;
    }

    let dot: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    1.0 - dot / (query_norm * target_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = VectorIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let mut index = VectorIndex::new(3);
        let embedding = vec![1.0, 0.0, 0.0];

        index.insert(1, 12345, embedding.clone()).unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.contains(1));

        let entry = index.get(1).unwrap();
        assert_eq!(entry.content_hash, 12345);
        assert_eq!(entry.embedding, embedding);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut index = VectorIndex::new(3);
        index.insert(1, 100, vec![1.0, 0.0, 0.0]).unwrap();

        let result = index.insert(1, 200, vec![0.0, 1.0, 0.0]);
        assert!(matches!(result, Err(IndexError::DuplicateId(1))));
        assert_eq!(index.get(1).unwrap().content_hash, 100);
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = VectorIndex::new(3);
        let wrong_dims = vec![1.0, 0.0, 0.0, 0.0]; // 4 dims

        let result = index.insert(1, 12345, wrong_dims);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_sanitizes_non_finite() {
        let mut index = VectorIndex::new(3);
        index
            .insert(1, 100, vec![f32::NAN, f32::INFINITY, 1.0])
            .unwrap();

        assert_eq!(index.get(1).unwrap().embedding, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let mut index = VectorIndex::new(3);
        index.insert(1, 100, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, 200, vec![0.0, 1.0, 0.0]).unwrap();

        index.update(1, 101, vec![0.0, 0.0, 1.0]).unwrap();

        let entry = index.get(1).unwrap();
        assert_eq!(entry.content_hash, 101);
        assert_eq!(entry.embedding, vec![0.0, 0.0, 1.0]);

        // position in the internal ordering is unchanged
        let ids: Vec<u64> = index.ids().collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_update_absent_rejected() {
        let mut index = VectorIndex::new(3);
        let result = index.update(1, 100, vec![1.0, 0.0, 0.0]);
        assert!(matches!(result, Err(IndexError::IdNotFound(1))));
    }

    #[test]
    fn test_remove() {
        let mut index = VectorIndex::new(3);
        index.insert(1, 100, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, 200, vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(3, 300, vec![0.0, 0.0, 1.0]).unwrap();

        let removed = index.remove(2);
        assert!(removed.is_some());
        assert!(!index.contains(2));
        assert_eq!(index.len(), 2);

        // remaining entries stay addressable and ordered
        assert_eq!(index.get(3).unwrap().content_hash, 300);
        let ids: Vec<u64> = index.ids().collect();
        assert_eq!(ids, vec![1, 3]);

        assert!(index.remove(2).is_none());
    }

    #[test]
    fn test_query_orders_by_ascending_distance() {
        let mut index = VectorIndex::new(3);

        index.insert(1, 100, vec![1.0, 0.0, 0.0]).unwrap();
        index.insert(2, 200, vec![0.0, 1.0, 0.0]).unwrap();
        index.insert(3, 300, vec![0.9, 0.1, 0.0]).unwrap();

        let results = index.query(&[1.0, 0.0, 0.0], 10).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 1);
        assert_eq!(results[1].0, 3);
        assert_eq!(results[2].0, 2);
        assert!(results[0].1 <= results[1].1);
        assert!(results[1].1 <= results[2].1);
        assert!(results[0].1.abs() < 1e-5);
    }

    #[test]
    fn test_query_k_bounds() {
        let mut index = VectorIndex::new(3);
        for i in 0..5u64 {
            index
                .insert(i, i * 100, vec![1.0, i as f32 * 0.1, 0.0])
                .unwrap();
        }

        assert_eq!(index.query(&[1.0, 0.0, 0.0], 3).unwrap().len(), 3);
        // fewer stored than requested: return all of them
        assert_eq!(index.query(&[1.0, 0.0, 0.0], 50).unwrap().len(), 5);
        assert!(matches!(
            index.query(&[1.0, 0.0, 0.0], 0),
            Err(IndexError::InvalidK)
        ));
    }

    #[test]
    fn test_query_distance_ties_keep_insertion_order() {
        let mut index = VectorIndex::new(2);
        // same vector under three ids: identical distances
        index.insert(30, 0, vec![1.0, 0.0]).unwrap();
        index.insert(10, 0, vec![1.0, 0.0]).unwrap();
        index.insert(20, 0, vec![1.0, 0.0]).unwrap();

        let results = index.query(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = results.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn test_query_zero_norm_target_ranks_last() {
        let mut index = VectorIndex::new(2);
        index.insert(1, 0, vec![0.0, 0.0]).unwrap();
        index.insert(2, 0, vec![1.0, 0.0]).unwrap();

        let results = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results[0].0, 2);
        assert_eq!(results[1].0, 1);
        assert!((results[1].1 - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_get_all_preserves_insertion_order() {
        let mut index = VectorIndex::new(2);
        index.insert(5, 0, vec![1.0, 0.0]).unwrap();
        index.insert(2, 0, vec![0.0, 1.0]).unwrap();
        index.insert(9, 0, vec![1.0, 1.0]).unwrap();

        let all = index.get_all();
        let ids: Vec<u64> = all.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![5, 2, 9]);
    }

    #[test]
    fn test_clear() {
        let mut index = VectorIndex::new(2);
        index.insert(1, 0, vec![1.0, 0.0]).unwrap();
        index.clear();

        assert!(index.is_empty());
        assert!(!index.contains(1));
    }

    #[test]
    fn test_sanitize_vector() {
        let mut v = vec![1.0, f32::NAN, f32::NEG_INFINITY, 2.0];
        sanitize_vector(&mut v);
        assert_eq!(v, vec![1.0, 0.0, 0.0, 2.0]);
    }

    #[test]
    fn test_normalize_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < f32::EPSILON);
        assert!((v[1] - 0.8).abs() < f32::EPSILON);

        // zero norm left unchanged instead of dividing by zero
        let mut zero = vec![0.0, 0.0];
        normalize_vector(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
