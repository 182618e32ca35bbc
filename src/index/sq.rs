//! Scalar quantization: per-dimension 8-bit codes or half-precision floats.

use half::f16;
use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::index::distance::compute_distance;
use crate::index::topk::TopK;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqKind {
    /// Uniform 8-bit codes between trained per-dimension bounds.
    Q8,
    /// IEEE half precision, no training needed.
    Fp16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalarQuantizer {
    kind: SqKind,
    dim: usize,
    vmin: Vec<f32>,
    vdiff: Vec<f32>,
    trained: bool,
}

impl ScalarQuantizer {
    pub fn new(kind: SqKind, dim: usize) -> Self {
        Self {
            kind,
            dim,
            vmin: Vec::new(),
            vdiff: Vec::new(),
            trained: kind == SqKind::Fp16,
        }
    }

    pub fn kind(&self) -> SqKind {
        self.kind
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Bytes per encoded vector.
    pub fn code_size(&self) -> usize {
        match self.kind {
            SqKind::Q8 => self.dim,
            SqKind::Fp16 => self.dim * 2,
        }
    }

    /// Reject parameters that `encode`/`decode` could not index safely.
    pub fn check(&self) -> Result<()> {
        if self.dim == 0 || self.dim.checked_mul(2).is_none() {
            return Err(QuiverError::corrupt(format!(
                "scalar quantizer dimension {} out of range",
                self.dim
            )));
        }
        match self.kind {
            SqKind::Fp16 if !self.trained => Err(QuiverError::corrupt(
                "half-precision quantizer marked untrained",
            )),
            SqKind::Q8 if self.trained && (self.vmin.len() != self.dim || self.vdiff.len() != self.dim) => {
                Err(QuiverError::corrupt(format!(
                    "8-bit quantizer bounds cover {} and {} of {} dimensions",
                    self.vmin.len(),
                    self.vdiff.len(),
                    self.dim
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn train(&mut self, vectors: &[f32]) {
        if self.kind == SqKind::Fp16 {
            return;
        }
        let mut vmin = vec![f32::MAX; self.dim];
        let mut vmax = vec![f32::MIN; self.dim];
        for row in vectors.chunks_exact(self.dim) {
            for (j, &x) in row.iter().enumerate() {
                vmin[j] = vmin[j].min(x);
                vmax[j] = vmax[j].max(x);
            }
        }
        self.vdiff = vmin.iter().zip(vmax.iter()).map(|(lo, hi)| hi - lo).collect();
        self.vmin = vmin;
        self.trained = true;
    }

    pub fn encode(&self, x: &[f32], code: &mut [u8]) {
        match self.kind {
            SqKind::Q8 => {
                for j in 0..self.dim {
                    let v = if self.vdiff[j] > 0.0 {
                        ((x[j] - self.vmin[j]) / self.vdiff[j]).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    code[j] = (v * 255.0).round() as u8;
                }
            }
            SqKind::Fp16 => {
                for (j, chunk) in code.chunks_exact_mut(2).enumerate() {
                    chunk.copy_from_slice(&f16::from_f32(x[j]).to_le_bytes());
                }
            }
        }
    }

    pub fn decode(&self, code: &[u8], out: &mut [f32]) {
        match self.kind {
            SqKind::Q8 => {
                for j in 0..self.dim {
                    out[j] = self.vmin[j] + code[j] as f32 / 255.0 * self.vdiff[j];
                }
            }
            SqKind::Fp16 => {
                for (j, chunk) in code.chunks_exact(2).enumerate() {
                    out[j] = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqStructure {
    metric: Metric,
    sq: ScalarQuantizer,
    codes: Vec<u8>,
}

impl SqStructure {
    pub fn new(dim: usize, metric: Metric, kind: SqKind) -> Self {
        Self {
            metric,
            sq: ScalarQuantizer::new(kind, dim),
            codes: Vec::new(),
        }
    }

    pub fn quantizer(&self) -> &ScalarQuantizer {
        &self.sq
    }
}

impl VectorStructure for SqStructure {
    fn family(&self) -> &'static str {
        match self.sq.kind {
            SqKind::Q8 => "SQ8",
            SqKind::Fp16 => "SQfp16",
        }
    }

    fn dimension(&self) -> usize {
        self.sq.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        self.sq.is_trained()
    }

    fn ntotal(&self) -> usize {
        self.codes.len() / self.sq.code_size()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.sq.train(vectors);
        Ok(())
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let cs = self.sq.code_size();
        let start = self.codes.len();
        self.codes.resize(start + vectors.len() / self.sq.dim * cs, 0);
        for (row, code) in vectors
            .chunks_exact(self.sq.dim)
            .zip(self.codes[start..].chunks_exact_mut(cs))
        {
            self.sq.encode(row, code);
        }
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        let mut top = TopK::new(k, self.metric);
        let mut decoded = vec![0.0f32; self.sq.dim];
        for (pos, code) in self.codes.chunks_exact(self.sq.code_size()).enumerate() {
            self.sq.decode(code, &mut decoded);
            top.push(pos as VectorId, compute_distance(query, &decoded, self.metric));
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
        let cs = self.sq.code_size();
        let pos = id as usize;
        self.sq.decode(&self.codes[pos * cs..(pos + 1) * cs], out);
        Ok(())
    }

    fn reset(&mut self) {
        self.codes.clear();
    }

    fn encodes_with_training(&self) -> bool {
        self.sq.kind == SqKind::Q8
    }

    fn check_invariants(&self) -> Result<()> {
        self.sq.check()?;
        if self.codes.len() % self.sq.code_size() != 0 {
            return Err(QuiverError::corrupt(format!(
                "{} code bytes do not split into {}-byte codes",
                self.codes.len(),
                self.sq.code_size()
            )));
        }
        if !self.sq.is_trained() && !self.codes.is_empty() {
            return Err(QuiverError::corrupt("untrained scalar quantizer holds codes"));
        }
        Ok(())
    }
}
