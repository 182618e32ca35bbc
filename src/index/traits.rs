//! Capability interface every index structure satisfies.
//!
//! The `Index` shell validates shapes, lifecycle and read-only state before
//! delegating here, so implementations may assume `vectors.len()` is a
//! multiple of `dimension()` and that ids line up with vectors.

use crate::error::{QuiverError, Result};
use crate::types::{Metric, VectorId};

pub trait VectorStructure: Send + Sync {
    /// Short human-readable family name, used in logs and errors.
    fn family(&self) -> &'static str;

    fn dimension(&self) -> usize;

    fn metric(&self) -> Metric;

    /// Whether `add`/`search` may be called.
    fn is_trained(&self) -> bool;

    /// Number of vectors currently stored.
    fn ntotal(&self) -> usize;

    /// Fit internal structure from scratch on `vectors`.
    fn train(&mut self, vectors: &[f32]) -> Result<()>;

    /// Append vectors with sequential ids starting at `ntotal()`.
    fn add(&mut self, vectors: &[f32]) -> Result<()>;

    /// Append vectors under caller-chosen ids.
    fn add_with_ids(&mut self, _vectors: &[f32], _ids: &[VectorId]) -> Result<()> {
        Err(QuiverError::unsupported(
            "add_with_ids",
            format!("{} cannot associate arbitrary ids", self.family()),
        ))
    }

    /// Best-first `(id, score)` pairs for a single query, at most `k` long.
    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)>;

    /// Write the stored (or decoded) vector for `id` into `out`.
    fn reconstruct(&self, id: VectorId, out: &mut [f32]) -> Result<()>;

    /// Drop all stored vectors, keeping trained state.
    fn reset(&mut self);

    /// Whether stored vectors are encoded with trained parameters, so that
    /// training again would invalidate them.
    fn encodes_with_training(&self) -> bool;

    /// Check internal consistency of state that arrived from outside the
    /// process. Violations are reported as `CorruptData`.
    fn check_invariants(&self) -> Result<()>;
}
