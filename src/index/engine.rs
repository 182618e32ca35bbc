//! The `Index` shell.
//!
//! Owns one [`Structure`] plus the attributes fixed at construction, and is
//! the single place where shapes, training state and read-only flags are
//! checked before work is delegated to the structure.

use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::error::{QuiverError, Result};
use crate::index::factory;
use crate::index::structure::Structure;
use crate::index::topk::fill_row;
use crate::index::traits::VectorStructure;
use crate::metrics::{observe, VECTORS_ADDED_TOTAL};
use crate::types::{buffer_len, IoFlags, Metric, Residency, VectorId};

/// Result of a batched search: `n * k` distances and labels, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutput {
    pub distances: Vec<f32>,
    pub labels: Vec<VectorId>,
}

#[derive(Debug, Clone)]
pub struct Index {
    dimension: usize,
    description: String,
    metric: Metric,
    residency: Residency,
    read_only: bool,
    structure: Structure,
}

impl Index {
    /// Build an empty index from a factory description such as `"Flat"`,
    /// `"IVF64,PQ8"` or `"IDMap,SQ8"`.
    #[instrument]
    pub fn new(dimension: usize, description: &str, metric: Metric) -> Result<Self> {
        let structure = factory::build(description, dimension, metric)?;
        debug!(family = structure.family(), "created index");
        Ok(Self::from_parts(
            description.trim().to_string(),
            metric,
            structure,
            Residency::Host,
            false,
        ))
    }

    pub(crate) fn from_parts(
        description: String,
        metric: Metric,
        structure: Structure,
        residency: Residency,
        read_only: bool,
    ) -> Self {
        Self {
            dimension: structure.dimension(),
            description,
            metric,
            residency,
            read_only,
            structure,
        }
    }

    pub fn dim(&self) -> usize {
        self.dimension
    }

    pub fn n_total(&self) -> usize {
        self.structure.ntotal()
    }

    pub fn is_trained(&self) -> bool {
        self.structure.is_trained()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub(crate) fn structure_mut(&mut self) -> &mut Structure {
        &mut self.structure
    }

    pub(crate) fn ensure_mutable(&self, op: &'static str) -> Result<()> {
        if self.read_only {
            return Err(QuiverError::unsupported(op, "index was opened read-only"));
        }
        Ok(())
    }

    fn check_vectors(&self, op: &'static str, n: usize, vectors: &[f32]) -> Result<()> {
        let expected = buffer_len(op, n, self.dimension)?;
        if vectors.len() != expected {
            return Err(QuiverError::dimension(
                op,
                format!(
                    "expected {n} x {} = {expected} floats, got {}",
                    self.dimension,
                    vectors.len()
                ),
            ));
        }
        Ok(())
    }

    fn check_ids(op: &'static str, n: usize, ids: &[VectorId]) -> Result<()> {
        if ids.len() != n {
            return Err(QuiverError::dimension(
                op,
                format!("expected {n} ids, got {}", ids.len()),
            ));
        }
        Ok(())
    }

    fn ensure_trained(&self, op: &'static str) -> Result<()> {
        if !self.structure.is_trained() {
            return Err(QuiverError::NotTrained {
                op,
                description: self.description.clone(),
            });
        }
        Ok(())
    }

    /// Deep copy resident on accelerator `device`.
    pub fn clone_to_gpu(&self, device: i32) -> Result<Index> {
        crate::residency::to_accelerator(self, device)
    }

    /// Deep copy resident in host memory.
    pub fn clone_to_host(&self) -> Index {
        let mut copy = self.clone();
        copy.residency = Residency::Host;
        copy
    }

    /// Train on `n` vectors. Re-training starts from scratch.
    ///
    /// Structures whose encoding depends on training must be empty: their
    /// stored codes are only meaningful under the parameters they were
    /// written with, so a populated one has to be `reset` first. On error
    /// the index is left exactly as it was.
    #[instrument(skip(self, vectors), fields(d = self.dimension))]
    pub fn train(&mut self, n: usize, vectors: &[f32]) -> Result<()> {
        self.ensure_mutable("train")?;
        if n == 0 {
            return Err(QuiverError::dimension("train", "n must be positive, got 0"));
        }
        self.check_vectors("train", n, vectors)?;
        if !self.structure.encodes_with_training() {
            observe("train", || self.structure.train(vectors))?;
            return Ok(());
        }
        if self.n_total() > 0 {
            warn!(n_total = self.n_total(), "refusing to re-train a populated index");
            return Err(QuiverError::unsupported(
                "train",
                format!(
                    "'{}' holds {} encoded vectors; reset before re-training",
                    self.description,
                    self.n_total()
                ),
            ));
        }
        let mut trained = self.structure.clone();
        observe("train", || trained.train(vectors))?;
        self.structure = trained;
        debug!(trained = self.is_trained(), "train complete");
        Ok(())
    }

    /// Append `n` vectors with sequential ids starting at `n_total()`.
    #[instrument(skip(self, vectors), fields(d = self.dimension))]
    pub fn add(&mut self, n: usize, vectors: &[f32]) -> Result<()> {
        self.ensure_mutable("add")?;
        self.check_vectors("add", n, vectors)?;
        self.ensure_trained("add")?;
        if n == 0 {
            return Ok(());
        }
        observe("add", || self.structure.add(vectors))?;
        VECTORS_ADDED_TOTAL.inc_by(n as u64);
        debug!(n_total = self.n_total(), "add complete");
        Ok(())
    }

    /// Append `n` vectors under caller-chosen ids.
    #[instrument(skip(self, vectors, ids), fields(d = self.dimension))]
    pub fn add_with_ids(&mut self, n: usize, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        self.ensure_mutable("add_with_ids")?;
        self.check_vectors("add_with_ids", n, vectors)?;
        Self::check_ids("add_with_ids", n, ids)?;
        if !self.structure.supports_ids() {
            return Err(QuiverError::unsupported(
                "add_with_ids",
                format!("'{}' cannot associate arbitrary ids", self.description),
            ));
        }
        self.ensure_trained("add_with_ids")?;
        if n == 0 {
            return Ok(());
        }
        observe("add_with_ids", || self.structure.add_with_ids(vectors, ids))?;
        VECTORS_ADDED_TOTAL.inc_by(n as u64);
        debug!(n_total = self.n_total(), "add_with_ids complete");
        Ok(())
    }

    /// k nearest neighbours for each of `n` queries.
    pub fn search(&self, n: usize, queries: &[f32], k: usize) -> Result<SearchOutput> {
        self.check_vectors("search", n, queries)?;
        let slots = buffer_len("search", n, k)?;
        let mut distances = vec![0.0f32; slots];
        let mut labels = vec![0 as VectorId; slots];
        self.search_into(n, queries, k, &mut distances, &mut labels)?;
        Ok(SearchOutput { distances, labels })
    }

    /// Like [`Index::search`], writing into caller-allocated `n * k` buffers.
    #[instrument(skip(self, queries, distances, labels), fields(d = self.dimension))]
    pub fn search_into(
        &self,
        n: usize,
        queries: &[f32],
        k: usize,
        distances: &mut [f32],
        labels: &mut [VectorId],
    ) -> Result<()> {
        if k == 0 {
            return Err(QuiverError::dimension("search", "k must be positive, got 0"));
        }
        self.check_vectors("search", n, queries)?;
        let slots = buffer_len("search", n, k)?;
        if distances.len() != slots || labels.len() != slots {
            return Err(QuiverError::dimension(
                "search",
                format!(
                    "output buffers must hold {slots} entries, got {} distances and {} labels",
                    distances.len(),
                    labels.len()
                ),
            ));
        }
        self.ensure_trained("search")?;
        if n == 0 {
            return Ok(());
        }
        observe("search", || {
            for ((query, d_row), l_row) in queries
                .chunks_exact(self.dimension)
                .zip(distances.chunks_exact_mut(k))
                .zip(labels.chunks_exact_mut(k))
            {
                let hits = self.structure.search_one(query, k);
                fill_row(&hits, self.metric, d_row, l_row);
            }
            Ok(())
        })
    }

    /// Drop all stored vectors; trained state is kept.
    #[instrument(skip(self), fields(d = self.dimension))]
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_mutable("reset")?;
        self.structure.reset();
        debug!("reset complete");
        Ok(())
    }

    pub fn reconstruct(&self, id: VectorId) -> Result<Vec<f32>> {
        let mut out = vec![0.0f32; self.dimension];
        self.structure.reconstruct(id, &mut out)?;
        Ok(out)
    }

    pub fn reconstruct_batch(&self, n: usize, keys: &[VectorId]) -> Result<Vec<f32>> {
        Self::check_ids("reconstruct_batch", n, keys)?;
        let mut out = vec![0.0f32; buffer_len("reconstruct_batch", n, self.dimension)?];
        self.reconstruct_batch_into(n, keys, &mut out)?;
        Ok(out)
    }

    /// Reconstruct `n` vectors into a caller-allocated `n * dim` buffer.
    /// The buffer is left untouched when any key is missing.
    #[instrument(skip(self, keys, out), fields(d = self.dimension))]
    pub fn reconstruct_batch_into(
        &self,
        n: usize,
        keys: &[VectorId],
        out: &mut [f32],
    ) -> Result<()> {
        Self::check_ids("reconstruct_batch", n, keys)?;
        self.check_vectors("reconstruct_batch", n, out)?;
        let mut scratch = vec![0.0f32; out.len()];
        observe("reconstruct_batch", || {
            for (&key, row) in keys.iter().zip(scratch.chunks_exact_mut(self.dimension)) {
                self.structure.reconstruct(key, row)?;
            }
            Ok(())
        })?;
        out.copy_from_slice(&scratch);
        Ok(())
    }

    /// `vectors[i] - reconstruct(keys[i])` for each of the `n` rows.
    #[instrument(skip(self, vectors, keys), fields(d = self.dimension))]
    pub fn compute_residuals(
        &self,
        n: usize,
        vectors: &[f32],
        keys: &[VectorId],
    ) -> Result<Vec<f32>> {
        self.check_vectors("compute_residuals", n, vectors)?;
        Self::check_ids("compute_residuals", n, keys)?;
        let mut residuals = vec![0.0f32; vectors.len()];
        observe("compute_residuals", || {
            for ((x, &key), r) in vectors
                .chunks_exact(self.dimension)
                .zip(keys)
                .zip(residuals.chunks_exact_mut(self.dimension))
            {
                self.structure.reconstruct(key, r)?;
                for (ri, xi) in r.iter_mut().zip(x) {
                    *ri = xi - *ri;
                }
            }
            Ok(())
        })?;
        Ok(residuals)
    }

    /// Inverted lists probed per query. Only IVF structures have one.
    pub fn nprobe(&self) -> Option<usize> {
        self.structure.as_ivf().map(|ivf| ivf.nprobe())
    }

    pub fn set_nprobe(&mut self, nprobe: usize) -> Result<()> {
        let description = self.description.clone();
        let ivf = self.structure.as_ivf_mut().ok_or_else(|| {
            QuiverError::unsupported("set_nprobe", format!("'{description}' has no inverted lists"))
        })?;
        ivf.set_nprobe(nprobe);
        Ok(())
    }

    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::codec::write_to_file(self, path.as_ref())
    }

    pub fn read_from_file(path: impl AsRef<Path>, flags: IoFlags) -> Result<Index> {
        crate::codec::read_from_file(path.as_ref(), flags)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        crate::codec::encode(self)
    }

    pub fn from_bytes(bytes: &[u8], flags: IoFlags) -> Result<Index> {
        crate::codec::decode(bytes, flags)
    }
}
