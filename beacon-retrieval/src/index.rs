//! Exact nearest-neighbor search over embedding vectors.
//!
//! [`VectorIndex`] is a flat L2 index: every query scans every stored
//! vector and returns the k nearest by Euclidean distance. Catalogs are
//! small (hundreds of rows), so exactness beats an approximate structure
//! here, and rankings are reproducible bit-for-bit across rebuilds.

use crate::error::{RetrievalError, Result};

/// A search hit: the L2 distance and the position of the matched vector.
///
/// Positions correspond to the catalog's document list; vector `i` embeds
/// document `i`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    /// Euclidean distance between the query and the stored vector.
    pub distance: f32,
    /// Position of the stored vector in insertion order.
    pub position: usize,
}

/// A read-only flat L2 index over a catalog's embedding vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Create an empty index of the given dimensionality.
    pub fn empty(dimensions: usize) -> Self {
        Self { dimensions, vectors: Vec::new() }
    }

    /// Build an index from a complete vector set.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Build`] if any vector's length differs
    /// from `dimensions` — a partially consistent index is never produced.
    pub fn from_vectors(dimensions: usize, vectors: Vec<Vec<f32>>) -> Result<Self> {
        for (position, vector) in vectors.iter().enumerate() {
            if vector.len() != dimensions {
                return Err(RetrievalError::Build {
                    catalog: String::new(),
                    message: format!(
                        "vector {position} has {} dimensions, index expects {dimensions}",
                        vector.len()
                    ),
                });
            }
        }
        Ok(Self { dimensions, vectors })
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality of the stored vectors.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Return up to `k` nearest vectors by ascending L2 distance.
    ///
    /// Ties keep insertion order. A query of the wrong dimensionality
    /// returns no hits (logged), never a panic: a live query must not die
    /// on an index/provider mismatch.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<IndexHit> {
        if query.len() != self.dimensions {
            tracing::warn!(
                query_dims = query.len(),
                index_dims = self.dimensions,
                "query dimensionality does not match index; returning no candidates"
            );
            return Vec::new();
        }
        if k == 0 || self.vectors.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<IndexHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| IndexHit { distance: l2_distance(query, vector), position })
            .collect();

        // Stable sort: equal distances keep insertion order.
        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

/// Euclidean distance between two equal-length vectors.
fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VectorIndex {
        VectorIndex::from_vectors(
            2,
            vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap()
    }

    #[test]
    fn search_orders_by_ascending_distance() {
        let hits = index().search(&[0.0, 0.0], 4);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[3].position, 1);
        assert!((hits[3].distance - 5.0).abs() < 1e-6);
        for pair in hits.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
    }

    #[test]
    fn ties_keep_insertion_order() {
        // Positions 2 and 3 are both at distance 1 from the origin.
        let hits = index().search(&[0.0, 0.0], 3);
        assert_eq!(hits[1].position, 2);
        assert_eq!(hits[2].position, 3);
    }

    #[test]
    fn k_larger_than_index_returns_all() {
        assert_eq!(index().search(&[0.0, 0.0], 100).len(), 4);
    }

    #[test]
    fn zero_k_and_empty_index_return_nothing() {
        assert!(index().search(&[0.0, 0.0], 0).is_empty());
        assert!(VectorIndex::empty(2).search(&[0.0, 0.0], 5).is_empty());
    }

    #[test]
    fn mismatched_vector_rejected_at_build() {
        let err = VectorIndex::from_vectors(2, vec![vec![0.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("dimensions"));
    }

    #[test]
    fn mismatched_query_returns_no_hits() {
        assert!(index().search(&[0.0, 0.0, 0.0], 2).is_empty());
    }
}
