//! Wrapper translating caller-chosen ids to the positions of an inner structure.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};
use crate::index::structure::Structure;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdMapStructure {
    inner: Box<Structure>,
    /// External id for each inner position.
    ids: Vec<VectorId>,
    /// External id -> latest inner position holding it.
    positions: HashMap<VectorId, usize>,
}

impl IdMapStructure {
    pub fn new(inner: Structure) -> Self {
        Self {
            inner: Box::new(inner),
            ids: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn inner(&self) -> &Structure {
        &self.inner
    }

    pub(crate) fn inner_mut(&mut self) -> &mut Structure {
        &mut self.inner
    }
}

impl VectorStructure for IdMapStructure {
    fn family(&self) -> &'static str {
        "IDMap"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn metric(&self) -> Metric {
        self.inner.metric()
    }

    fn is_trained(&self) -> bool {
        self.inner.is_trained()
    }

    fn ntotal(&self) -> usize {
        self.ids.len()
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        self.inner.train(vectors)
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        let start = self.ids.len() as VectorId;
        let ids: Vec<VectorId> = (0..(vectors.len() / self.dimension()) as VectorId)
            .map(|i| start + i)
            .collect();
        self.add_with_ids(vectors, &ids)
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        let base = self.inner.ntotal();
        self.inner.add(vectors)?;
        for (offset, &id) in ids.iter().enumerate() {
            self.positions.insert(id, base + offset);
        }
        self.ids.extend_from_slice(ids);
        Ok(())
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        self.inner
            .search_one(query, k)
            .into_iter()
            .map(|(pos, score)| (self.ids[pos as usize], score))
            .collect()
    }

    fn reconstruct(&self, id: VectorId, out: &mut [f32]) -> Result<()> {
        let pos = *self.positions.get(&id).ok_or(QuiverError::NotFound {
            op: "reconstruct",
            id,
        })?;
        self.inner.reconstruct(pos as VectorId, out)
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.ids.clear();
        self.positions.clear();
    }

    fn encodes_with_training(&self) -> bool {
        self.inner.encodes_with_training()
    }

    fn check_invariants(&self) -> Result<()> {
        self.inner.check_invariants()?;
        if self.ids.len() != self.inner.ntotal() {
            return Err(QuiverError::corrupt(format!(
                "id map holds {} ids for {} stored vectors",
                self.ids.len(),
                self.inner.ntotal()
            )));
        }
        if let Some((id, pos)) = self
            .positions
            .iter()
            .find(|&(id, &pos)| self.ids.get(pos) != Some(id))
        {
            return Err(QuiverError::corrupt(format!(
                "id {id} maps to position {pos}, which holds another id"
            )));
        }
        Ok(())
    }
}
