//! Inverted-file structure.
//!
//! A flat coarse quantizer partitions the space into `nlist` cells trained
//! with k-means. Each vector is stored in the inverted list of its nearest
//! cell, encoded raw (`Flat`) or as a quantized residual against the cell
//! centroid (`PQ`, `SQ8`, `SQfp16`). Search scans the `nprobe` closest cells.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clustering::ClusteringState;
use crate::error::{QuiverError, Result};
use crate::index::distance::compute_distance;
use crate::index::flat::FlatStructure;
use crate::index::pq::ProductQuantizer;
use crate::index::sq::ScalarQuantizer;
use crate::index::topk::TopK;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

/// How vectors are stored inside inverted lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ListCodec {
    Flat,
    Pq(ProductQuantizer),
    Sq(ScalarQuantizer),
}

impl ListCodec {
    fn code_size(&self, dim: usize) -> usize {
        match self {
            ListCodec::Flat => dim * 4,
            ListCodec::Pq(pq) => pq.code_size(),
            ListCodec::Sq(sq) => sq.code_size(),
        }
    }

    /// Parameters must be sound and agree with the owning structure.
    fn check(&self, dim: usize) -> Result<()> {
        let codec_dim = match self {
            ListCodec::Flat => {
                return dim
                    .checked_mul(4)
                    .map(|_| ())
                    .ok_or_else(|| QuiverError::corrupt(format!("dimension {dim} out of range")));
            }
            ListCodec::Pq(pq) => {
                pq.check()?;
                pq.dimension()
            }
            ListCodec::Sq(sq) => {
                sq.check()?;
                sq.dimension()
            }
        };
        if codec_dim != dim {
            return Err(QuiverError::corrupt(format!(
                "list codec dimension {codec_dim} differs from inverted file dimension {dim}"
            )));
        }
        Ok(())
    }

    fn check_codes(&self, codes: &[u8]) -> Result<()> {
        match self {
            ListCodec::Pq(pq) => pq.check_codes(codes),
            ListCodec::Flat | ListCodec::Sq(_) => Ok(()),
        }
    }

    fn by_residual(&self) -> bool {
        !matches!(self, ListCodec::Flat)
    }

    fn is_trained(&self) -> bool {
        match self {
            ListCodec::Flat => true,
            ListCodec::Pq(pq) => pq.is_trained(),
            ListCodec::Sq(sq) => sq.is_trained(),
        }
    }

    fn train(&mut self, residuals: &[f32]) -> Result<()> {
        match self {
            ListCodec::Flat => Ok(()),
            ListCodec::Pq(pq) => pq.train(residuals),
            ListCodec::Sq(sq) => {
                sq.train(residuals);
                Ok(())
            }
        }
    }

    fn encode(&self, x: &[f32], code: &mut [u8]) {
        match self {
            ListCodec::Flat => {
                for (chunk, v) in code.chunks_exact_mut(4).zip(x) {
                    chunk.copy_from_slice(&v.to_le_bytes());
                }
            }
            ListCodec::Pq(pq) => pq.encode(x, code),
            ListCodec::Sq(sq) => sq.encode(x, code),
        }
    }

    fn decode(&self, code: &[u8], out: &mut [f32]) {
        match self {
            ListCodec::Flat => {
                for (v, chunk) in out.iter_mut().zip(code.chunks_exact(4)) {
                    *v = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                }
            }
            ListCodec::Pq(pq) => pq.decode(code, out),
            ListCodec::Sq(sq) => sq.decode(code, out),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InvertedList {
    ids: Vec<VectorId>,
    codes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvfStructure {
    dim: usize,
    metric: Metric,
    nlist: usize,
    nprobe: usize,
    quantizer: FlatStructure,
    codec: ListCodec,
    lists: Vec<InvertedList>,
    /// id -> (list, offset within list)
    direct_map: HashMap<VectorId, (usize, usize)>,
    ntotal: usize,
    trained: bool,
}

impl IvfStructure {
    pub fn new(dim: usize, metric: Metric, nlist: usize, codec: ListCodec) -> Self {
        Self {
            dim,
            metric,
            nlist,
            nprobe: 1,
            quantizer: FlatStructure::new(dim, metric),
            codec,
            lists: vec![InvertedList::default(); nlist],
            direct_map: HashMap::new(),
            ntotal: 0,
            trained: false,
        }
    }

    pub fn nlist(&self) -> usize {
        self.nlist
    }

    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    pub fn codec(&self) -> &ListCodec {
        &self.codec
    }

    /// Number of cells scanned per query, clamped to `1..=nlist`.
    pub fn set_nprobe(&mut self, nprobe: usize) {
        self.nprobe = nprobe.clamp(1, self.nlist);
    }

    /// Sizes of each inverted list.
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(|l| l.ids.len()).collect()
    }

    fn assign(&self, x: &[f32]) -> usize {
        self.quantizer
            .search_one(x, 1)
            .first()
            .map(|&(id, _)| id as usize)
            .unwrap_or(0)
    }

    fn residual(&self, x: &[f32], list: usize, out: &mut [f32]) {
        let c = self.quantizer.vector(list);
        for ((o, a), b) in out.iter_mut().zip(x).zip(c) {
            *o = a - b;
        }
    }

    fn decode_entry(&self, list: usize, offset: usize, out: &mut [f32]) {
        let cs = self.codec.code_size(self.dim);
        let code = &self.lists[list].codes[offset * cs..(offset + 1) * cs];
        self.codec.decode(code, out);
        if self.codec.by_residual() {
            for (o, c) in out.iter_mut().zip(self.quantizer.vector(list)) {
                *o += c;
            }
        }
    }

    fn insert(&mut self, vectors: &[f32], ids: &[VectorId]) {
        let cs = self.codec.code_size(self.dim);
        let mut residual = vec![0.0f32; self.dim];
        let mut code = vec![0u8; cs];
        for (x, &id) in vectors.chunks_exact(self.dim).zip(ids) {
            let list = self.assign(x);
            if self.codec.by_residual() {
                self.residual(x, list, &mut residual);
                self.codec.encode(&residual, &mut code);
            } else {
                self.codec.encode(x, &mut code);
            }
            let inv = &mut self.lists[list];
            self.direct_map.insert(id, (list, inv.ids.len()));
            inv.ids.push(id);
            inv.codes.extend_from_slice(&code);
        }
        self.ntotal += ids.len();
    }
}

impl VectorStructure for IvfStructure {
    fn family(&self) -> &'static str {
        "IVF"
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn ntotal(&self) -> usize {
        self.ntotal
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        let n = vectors.len() / self.dim;
        let mut config = crate::runtime::settings().clustering.clone();
        config.spherical = self.metric.is_similarity();

        let mut clustering = ClusteringState::with_config(self.dim, self.nlist, config)?;
        let mut quantizer = FlatStructure::new(self.dim, self.metric);
        clustering.train_with(n, vectors, &mut quantizer)?;
        self.quantizer = quantizer;

        if self.codec.by_residual() {
            let mut residuals = vec![0.0f32; vectors.len()];
            for (x, r) in vectors
                .chunks_exact(self.dim)
                .zip(residuals.chunks_exact_mut(self.dim))
            {
                let list = self.assign(x);
                self.residual(x, list, r);
            }
            self.codec.train(&residuals)?;
        }

        self.trained = self.codec.is_trained();
        debug!(nlist = self.nlist, n, "trained inverted file");
        Ok(())
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let start = self.ntotal as VectorId;
        let ids: Vec<VectorId> = (0..(vectors.len() / self.dim) as VectorId)
            .map(|i| start + i)
            .collect();
        self.insert(vectors, &ids);
        Ok(())
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        self.insert(vectors, ids);
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        let mut top = TopK::new(k, self.metric);
        let mut decoded = vec![0.0f32; self.dim];
        for (list, _) in self.quantizer.search_one(query, self.nprobe) {
            let inv = &self.lists[list as usize];
            for offset in 0..inv.ids.len() {
                self.decode_entry(list as usize, offset, &mut decoded);
                top.push(inv.ids[offset], compute_distance(query, &decoded, self.metric));
            }
        }
        top.into_sorted()
    }

    fn reconstruct(&self, id: VectorId, out: &mut [f32]) -> Result<()> {
        let &(list, offset) = self.direct_map.get(&id).ok_or(QuiverError::NotFound {
            op: "reconstruct",
            id,
        })?;
        self.decode_entry(list, offset, out);
        Ok(())
    }

    fn reset(&mut self) {
        for inv in &mut self.lists {
            inv.ids.clear();
            inv.codes.clear();
        }
        self.direct_map.clear();
        self.ntotal = 0;
    }

    fn encodes_with_training(&self) -> bool {
        true
    }

    fn check_invariants(&self) -> Result<()> {
        if self.nlist == 0 || self.lists.len() != self.nlist {
            return Err(QuiverError::corrupt(format!(
                "inverted file declares {} lists but holds {}",
                self.nlist,
                self.lists.len()
            )));
        }
        if !(1..=self.nlist).contains(&self.nprobe) {
            return Err(QuiverError::corrupt(format!(
                "nprobe {} outside 1..={}",
                self.nprobe, self.nlist
            )));
        }
        self.quantizer.check_invariants()?;
        if self.quantizer.dimension() != self.dim || self.quantizer.metric() != self.metric {
            return Err(QuiverError::corrupt(
                "coarse quantizer does not match inverted file dimension or metric",
            ));
        }
        self.codec.check(self.dim)?;

        let centroids = self.quantizer.ntotal();
        if centroids != 0 && centroids != self.nlist {
            return Err(QuiverError::corrupt(format!(
                "coarse quantizer has {centroids} centroids for {} lists",
                self.nlist
            )));
        }
        if self.trained && (centroids == 0 || !self.codec.is_trained()) {
            return Err(QuiverError::corrupt("inverted file marked trained without trained parts"));
        }
        if !self.trained && self.ntotal != 0 {
            return Err(QuiverError::corrupt("untrained inverted file holds vectors"));
        }

        for (&id, &(list, offset)) in &self.direct_map {
            if self.lists.get(list).and_then(|inv| inv.ids.get(offset)) != Some(&id) {
                return Err(QuiverError::corrupt(format!(
                    "direct map sends id {id} to list {list} offset {offset}, which holds another entry"
                )));
            }
        }

        let cs = self.codec.code_size(self.dim);
        let mut stored = 0usize;
        for (list, inv) in self.lists.iter().enumerate() {
            if inv.ids.len().checked_mul(cs) != Some(inv.codes.len()) {
                return Err(QuiverError::corrupt(format!(
                    "list {list} holds {} ids but {} code bytes",
                    inv.ids.len(),
                    inv.codes.len()
                )));
            }
            self.codec.check_codes(&inv.codes)?;
            if let Some(id) = inv.ids.iter().find(|id| !self.direct_map.contains_key(id)) {
                return Err(QuiverError::corrupt(format!(
                    "id {id} in list {list} is missing from the direct map"
                )));
            }
            stored += inv.ids.len();
        }
        if stored != self.ntotal {
            return Err(QuiverError::corrupt(format!(
                "lists hold {stored} vectors but the count says {}",
                self.ntotal
            )));
        }
        Ok(())
    }
}
