//! Exact inner-product vector index.
//!
//! Vectors live in one contiguous row-major buffer; position `i` in the
//! index is the `i`-th vector added. Callers keep a metadata list aligned to
//! those positions. Search is a brute-force scan, which is exact and fast
//! enough for document collections in the tens of thousands of chunks.

use thiserror::Error;

use crate::embedding::inner_product;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error("vector dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("index dimension must be non-zero")]
    ZeroDimension,
    #[error("buffer of {len} floats is not a multiple of dimension {dims}")]
    RaggedBuffer { len: usize, dims: usize },
}

/// Fixed-dimension flat index.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dims: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dims: usize) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            dims,
            data: Vec::new(),
        })
    }

    /// Rebuild from a raw row-major buffer, as read back from disk.
    pub fn from_raw(dims: usize, data: Vec<f32>) -> Result<Self, IndexError> {
        if dims == 0 {
            return Err(IndexError::ZeroDimension);
        }
        if data.len() % dims != 0 {
            return Err(IndexError::RaggedBuffer {
                len: data.len(),
                dims,
            });
        }
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.data.len() / self.dims
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_raw(&self) -> &[f32] {
        &self.data
    }

    /// Append vectors. All-or-nothing: on a dimension mismatch nothing is added.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                found: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dims);
        for v in vectors {
            self.data.extend_from_slice(v);
        }
        Ok(())
    }

    /// The `k` highest inner products as `(position, score)`, best first.
    ///
    /// Ties keep insertion order. A query of the wrong dimension matches
    /// nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dims || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dims)
            .map(|row| inner_product(row, query))
            .enumerate()
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_dimension_rejected() {
        assert_eq!(FlatIndex::new(0), Err(IndexError::ZeroDimension));
    }

    #[test]
    fn test_add_and_search_orders_by_score() {
        let mut idx = FlatIndex::new(2).expect("index");
        idx.add(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]])
            .expect("add");
        assert_eq!(idx.len(), 3);
        let hits = idx.search(&[0.0, 1.0], 2);
        assert_eq!(hits.iter().map(|h| h.0).collect::<Vec<_>>(), vec![1, 2]);
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn test_k_larger_than_len() {
        let mut idx = FlatIndex::new(1).expect("index");
        idx.add(&[vec![1.0]]).expect("add");
        assert_eq!(idx.search(&[1.0], 10).len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_adds_nothing() {
        let mut idx = FlatIndex::new(3).expect("index");
        let err = idx.add(&[vec![1.0, 0.0, 0.0], vec![1.0]]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                found: 1
            }
        );
        assert!(idx.is_empty());
    }

    #[test]
    fn test_wrong_query_dimension() {
        let mut idx = FlatIndex::new(2).expect("index");
        idx.add(&[vec![1.0, 0.0]]).expect("add");
        assert!(idx.search(&[1.0], 5).is_empty());
    }

    #[test]
    fn test_from_raw() {
        let idx = FlatIndex::from_raw(2, vec![1.0, 0.0, 0.0, 1.0]).expect("raw");
        assert_eq!(idx.len(), 2);
        assert!(matches!(
            FlatIndex::from_raw(2, vec![1.0, 0.0, 0.0]),
            Err(IndexError::RaggedBuffer { .. })
        ));
    }
}
