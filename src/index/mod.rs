
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KccError, Result};

/// Exact nearest-neighbor index over the vector matrix.
///
/// This is a flat exhaustive structure: every query scans every row and
/// ranks by squared Euclidean distance. Vectors are stored unnormalized, so
/// the distance scale is whatever the embedding model produces. Built once
/// per corpus version and read-only afterwards; a corpus change means a
/// wholesale rebuild, never an in-place patch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    // Row-major, rows.len() * dimension entries, row order fixed at build
    // time and aligned 1:1 with the persisted text list.
    data: Vec<f32>,
}

/// One search hit: the matrix row and its squared L2 distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

impl FlatIndex {
    /// Bulk-build the index from the complete vector matrix.
    #[inline]
    pub fn build(dimension: usize, rows: &[Vec<f32>]) -> Result<Self> {
        if dimension == 0 {
            return Err(KccError::Index(
                "Index dimension must be non-zero".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(rows.len() * dimension);
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() != dimension {
                return Err(KccError::Index(format!(
                    "Row {row_idx} has dimension {}, expected {dimension}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }

        debug!(
            "Built flat L2 index: {} rows, dimension {}",
            rows.len(),
            dimension
        );

        Ok(Self { dimension, data })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let start = row.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Return the `k` nearest rows to `query` by squared L2 distance, in
    /// ascending order with ties broken by row order.
    ///
    /// A query of the wrong dimension is a configuration error (the serve
    /// model differs from the build model) and is rejected outright.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(KccError::Index(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(row, vector)| Neighbor {
                row,
                distance: squared_l2_distance(query, vector),
            })
            .collect();

        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row)));
        neighbors.truncate(k);

        Ok(neighbors)
    }
}

/// Squared Euclidean distance; smaller means more similar.
#[inline]
pub fn squared_l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}
