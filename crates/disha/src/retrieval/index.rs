//! Flat squared-Euclidean vector index.
//!
//! Brute-force search over a dense vector table, mirroring the semantics of
//! a flat L2 index: `search` returns (distances, ordinals) sorted by
//! ascending distance, lower = more similar. Built offline or on demand;
//! read-only at query time. `persist` writes to a temp file and renames so a
//! rebuild can swap a completed index without ever exposing a half-written
//! one.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt index file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn add(&mut self, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn add_all(&mut self, vectors: Vec<Vec<f32>>) -> Result<(), IndexError> {
        for vector in vectors {
            self.add(vector)?;
        }
        Ok(())
    }

    /// Top-k nearest vectors by squared Euclidean distance. Returns parallel
    /// (distances, ordinals) lists sorted by ascending distance; fewer than
    /// `k` results when the index is small.
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<usize>), IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if self.vectors.is_empty() || k == 0 {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| (squared_l2(query, vector), ordinal))
            .collect();
        scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok((
            scored.iter().map(|(d, _)| *d).collect(),
            scored.iter().map(|(_, o)| *o).collect(),
        ))
    }

    /// Write the index atomically: temp file in the same directory, then
    /// rename over the target.
    pub fn persist(&self, path: &Path) -> Result<(), IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(2);
        index.add(vec![0.0, 0.0]).unwrap();
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![3.0, 4.0]).unwrap();
        index
    }

    #[test]
    fn test_search_orders_by_distance() {
        let index = sample_index();
        let (distances, ordinals) = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(distances[0], 0.0);
        assert_eq!(distances[1], 1.0);
        assert_eq!(distances[2], 25.0);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample_index();
        let (distances, ordinals) = index.search(&[0.0, 0.0], 10).unwrap();
        assert_eq!(distances.len(), 3);
        assert_eq!(ordinals.len(), 3);
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = FlatIndex::new(2);
        let (distances, ordinals) = index.search(&[0.0, 0.0], 5).unwrap();
        assert!(distances.is_empty());
        assert!(ordinals.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = FlatIndex::new(2);
        assert!(matches!(
            index.add(vec![1.0]),
            Err(IndexError::DimensionMismatch { expected: 2, got: 1 })
        ));
        let index = sample_index();
        assert!(index.search(&[1.0, 2.0, 3.0], 1).is_err());
    }

    #[test]
    fn test_persist_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indices/qa/index.json");
        let index = sample_index();
        index.persist(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.dimension(), 2);
        let (distances, ordinals) = loaded.search(&[3.0, 4.0], 1).unwrap();
        assert_eq!(ordinals, vec![2]);
        assert_eq!(distances, vec![0.0]);
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        std::fs::write(&path, "not an index").unwrap();
        assert!(matches!(FlatIndex::load(&path), Err(IndexError::Corrupt(_))));
    }
}
