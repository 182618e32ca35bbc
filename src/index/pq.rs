//! Product quantization.
//!
//! Vectors are split into `m` subvectors of `dim / m` floats and each
//! subspace is quantized independently against a codebook of `2^nbits`
//! centroids trained with k-means. A code is `m` bytes, one centroid index
//! per subspace.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clustering::ClusteringState;
use crate::error::{QuiverError, Result};
use crate::index::distance::{compute_distance, inner_product, l2_squared};
use crate::index::flat::FlatStructure;
use crate::index::topk::TopK;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    dim: usize,
    m: usize,
    nbits: u32,
    dsub: usize,
    ksub: usize,
    /// `m * ksub * dsub` floats, codebook-major.
    centroids: Vec<f32>,
    trained: bool,
}

impl ProductQuantizer {
    /// Caller guarantees `m` divides `dim` and `1 <= nbits <= 8`.
    pub fn new(dim: usize, m: usize, nbits: u32) -> Self {
        let ksub = 1usize << nbits;
        Self {
            dim,
            m,
            nbits,
            dsub: dim / m,
            ksub,
            centroids: Vec::new(),
            trained: false,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn code_size(&self) -> usize {
        self.m
    }

    pub fn nbits(&self) -> u32 {
        self.nbits
    }

    /// Reject geometry or codebooks that `encode`/`decode` could not index
    /// safely.
    pub fn check(&self) -> Result<()> {
        if self.m == 0 || self.dim == 0 || self.dim % self.m != 0 || self.dsub != self.dim / self.m {
            return Err(QuiverError::corrupt(format!(
                "product quantizer splits dimension {} into {} x {}",
                self.dim, self.m, self.dsub
            )));
        }
        if !(1..=8).contains(&self.nbits) || self.ksub != 1usize << self.nbits {
            return Err(QuiverError::corrupt(format!(
                "product quantizer has {} centroids for {} bits",
                self.ksub, self.nbits
            )));
        }
        // m * ksub * dsub == ksub * dim
        if self.trained && self.dim.checked_mul(self.ksub) != Some(self.centroids.len()) {
            return Err(QuiverError::corrupt(format!(
                "product quantizer codebooks hold {} floats for {} x {} centroids",
                self.centroids.len(),
                self.ksub,
                self.dim
            )));
        }
        Ok(())
    }

    /// Every code byte must name an existing centroid.
    pub fn check_codes(&self, codes: &[u8]) -> Result<()> {
        match codes.iter().find(|&&c| c as usize >= self.ksub) {
            Some(c) => Err(QuiverError::corrupt(format!(
                "code {c} out of range for {} centroids",
                self.ksub
            ))),
            None => Ok(()),
        }
    }

    fn centroid(&self, sub: usize, code: usize) -> &[f32] {
        let start = (sub * self.ksub + code) * self.dsub;
        &self.centroids[start..start + self.dsub]
    }

    /// Train one codebook per subspace. Needs at least `2^nbits` vectors.
    pub fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let n = vectors.len() / self.dim;
        let mut config = crate::runtime::settings().clustering.clone();
        config.spherical = false;

        let mut centroids = Vec::with_capacity(self.m * self.ksub * self.dsub);
        let mut sub = Vec::with_capacity(n * self.dsub);
        for s in 0..self.m {
            sub.clear();
            for row in vectors.chunks_exact(self.dim) {
                sub.extend_from_slice(&row[s * self.dsub..(s + 1) * self.dsub]);
            }
            let mut clustering = ClusteringState::with_config(self.dsub, self.ksub, config.clone())?;
            let mut assigner = FlatStructure::new(self.dsub, Metric::L2);
            clustering.train_with(n, &sub, &mut assigner)?;
            centroids.extend_from_slice(clustering.centroids());
            debug!(subspace = s, ksub = self.ksub, "trained pq codebook");
        }

        self.centroids = centroids;
        self.trained = true;
        Ok(())
    }

    pub fn encode(&self, x: &[f32], code: &mut [u8]) {
        for s in 0..self.m {
            let xs = &x[s * self.dsub..(s + 1) * self.dsub];
            let mut best = 0usize;
            let mut best_d = f32::MAX;
            for c in 0..self.ksub {
                let d = l2_squared(xs, self.centroid(s, c));
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            code[s] = best as u8;
        }
    }

    pub fn decode(&self, code: &[u8], out: &mut [f32]) {
        for s in 0..self.m {
            out[s * self.dsub..(s + 1) * self.dsub]
                .copy_from_slice(self.centroid(s, code[s] as usize));
        }
    }

    /// Per-subspace score table for additive metrics: `table[s * ksub + c]`.
    pub fn compute_table(&self, query: &[f32], metric: Metric) -> Option<Vec<f32>> {
        let score: fn(&[f32], &[f32]) -> f32 = match metric {
            Metric::L2 => l2_squared,
            Metric::InnerProduct => inner_product,
            Metric::L1 | Metric::Linf => return None,
        };
        let mut table = Vec::with_capacity(self.m * self.ksub);
        for s in 0..self.m {
            let qs = &query[s * self.dsub..(s + 1) * self.dsub];
            for c in 0..self.ksub {
                table.push(score(qs, self.centroid(s, c)));
            }
        }
        Some(table)
    }

    #[inline]
    pub fn table_score(&self, table: &[f32], code: &[u8]) -> f32 {
        code.iter()
            .enumerate()
            .map(|(s, &c)| table[s * self.ksub + c as usize])
            .sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PqStructure {
    metric: Metric,
    pq: ProductQuantizer,
    codes: Vec<u8>,
}

impl PqStructure {
    pub fn new(dim: usize, metric: Metric, m: usize, nbits: u32) -> Self {
        Self {
            metric,
            pq: ProductQuantizer::new(dim, m, nbits),
            codes: Vec::new(),
        }
    }

    pub fn quantizer(&self) -> &ProductQuantizer {
        &self.pq
    }
}

impl VectorStructure for PqStructure {
    fn family(&self) -> &'static str {
        "PQ"
    }

    fn dimension(&self) -> usize {
        self.pq.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        self.pq.is_trained()
    }

    fn ntotal(&self) -> usize {
        self.codes.len() / self.pq.code_size()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.pq.train(vectors)
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let cs = self.pq.code_size();
        let start = self.codes.len();
        self.codes.resize(start + vectors.len() / self.pq.dim * cs, 0);
        for (row, code) in vectors
            .chunks_exact(self.pq.dim)
            .zip(self.codes[start..].chunks_exact_mut(cs))
        {
            self.pq.encode(row, code);
        }
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        let mut top = TopK::new(k, self.metric);
        let codes = self.codes.chunks_exact(self.pq.code_size()).enumerate();
        match self.pq.compute_table(query, self.metric) {
            Some(table) => {
                for (pos, code) in codes {
                    top.push(pos as VectorId, self.pq.table_score(&table, code));
                }
            }
            None => {
                let mut decoded = vec![0.0f32; self.pq.dim];
                for (pos, code) in codes {
                    self.pq.decode(code, &mut decoded);
                    top.push(pos as VectorId, compute_distance(query, &decoded, self.metric));
                }
            }
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
        let cs = self.pq.code_size();
        let pos = id as usize;
        self.pq.decode(&self.codes[pos * cs..(pos + 1) * cs], out);
        Ok(())
    }

    fn reset(&mut self) {
        self.codes.clear();
    }

    fn encodes_with_training(&self) -> bool {
        true
    }

    fn check_invariants(&self) -> Result<()> {
        self.pq.check()?;
        if self.codes.len() % self.pq.code_size() != 0 {
            return Err(QuiverError::corrupt(format!(
                "{} code bytes do not split into {}-byte codes",
                self.codes.len(),
                self.pq.code_size()
            )));
        }
        if !self.pq.is_trained() && !self.codes.is_empty() {
            return Err(QuiverError::corrupt("untrained product quantizer holds codes"));
        }
        self.pq.check_codes(&self.codes)
    }
}
