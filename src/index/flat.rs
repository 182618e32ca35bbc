//! Exact brute-force structure. Needs no training; ids are positions.

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::index::distance::compute_distance;
use crate::index::topk::TopK;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatStructure {
    dim: usize,
    metric: Metric,
    /// Row-major `ntotal * dim` floats.
    data: Vec<f32>,
}

impl FlatStructure {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            data: Vec::new(),
        }
    }

    /// Stored vector at position `pos`.
    pub fn vector(&self, pos: usize) -> &[f32] {
        &self.data[pos * self.dim..(pos + 1) * self.dim]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dim)
    }
}

impl VectorStructure for FlatStructure {
    fn family(&self) -> &'static str {
        "Flat"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        true
    }

    fn ntotal(&self) -> usize {
        self.data.len() / self.dim
    }

    fn train(&mut self, _vectors: &[f32]) -> Result<()> {
        Ok(())
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        self.data.extend_from_slice(vectors);
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        let mut top = TopK::new(k, self.metric);
        for (pos, row) in self.rows().enumerate() {
            top.push(pos as VectorId, compute_distance(query, row, self.metric));
        }
        top.into_sorted()
    }

    fn reconstruct(&self, id: VectorId, out: &mut [f32]) -> Result<()> {
        if id < 0 || id as usize >= self.ntotal() {
            return Err(QuiverError::NotFound {
                op: "reconstruct",
                id,
            });
        }
        out.copy_from_slice(self.vector(id as usize));
        Ok(())
    }

    fn reset(&mut self) {
        self.data.clear();
    }

    fn encodes_with_training(&self) -> bool {
        false
    }

    fn check_invariants(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(QuiverError::corrupt("flat structure has dimension 0"));
        }
        if self.data.len() % self.dim != 0 {
            return Err(QuiverError::corrupt(format!(
                "flat structure holds {} floats, not a multiple of dimension {}",
                self.data.len(),
                self.dim
            )));
        }
        Ok(())
    }
}
