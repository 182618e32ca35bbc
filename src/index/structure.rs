//! The closed set of structure variants an `Index` can hold.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::factory::{Encoding, IndexSpec};
use crate::index::flat::FlatStructure;
use crate::index::id_map::IdMapStructure;
use crate::index::ivf::{IvfStructure, ListCodec};
use crate::index::pq::PqStructure;
use crate::index::sq::SqStructure;
use crate::index::traits::VectorStructure;
use crate::types::{Metric, VectorId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Structure {
    Flat(FlatStructure),
    Pq(PqStructure),
    Sq(SqStructure),
    Ivf(IvfStructure),
    IdMap(IdMapStructure),
}

macro_rules! delegate {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Structure::Flat($s) => $body,
            Structure::Pq($s) => $body,
            Structure::Sq($s) => $body,
            Structure::Ivf($s) => $body,
            Structure::IdMap($s) => $body,
        }
    };
}

impl Structure {
    /// Whether arbitrary caller ids can be stored.
    pub fn supports_ids(&self) -> bool {
        matches!(self, Structure::Ivf(_) | Structure::IdMap(_))
    }

    /// The IVF layer, looking through an id map.
    pub fn as_ivf_mut(&mut self) -> Option<&mut IvfStructure> {
        match self {
            Structure::Ivf(ivf) => Some(ivf),
            Structure::IdMap(map) => map.inner_mut().as_ivf_mut(),
            _ => None,
        }
    }

    pub fn as_ivf(&self) -> Option<&IvfStructure> {
        match self {
            Structure::Ivf(ivf) => Some(ivf),
            Structure::IdMap(map) => map.inner().as_ivf(),
            _ => None,
        }
    }

    /// Whether this structure has the layering and encoding `spec` describes.
    pub fn matches_spec(&self, spec: &IndexSpec) -> bool {
        match self {
            Structure::IdMap(map) => {
                spec.id_map
                    && map.inner().matches_spec(&IndexSpec {
                        id_map: false,
                        ..*spec
                    })
            }
            _ if spec.id_map => false,
            Structure::Ivf(ivf) => {
                let leaf = match ivf.codec() {
                    ListCodec::Flat => Encoding::Flat,
                    ListCodec::Pq(pq) => Encoding::Pq {
                        m: pq.code_size(),
                        nbits: pq.nbits(),
                    },
                    ListCodec::Sq(sq) => Encoding::Sq(sq.kind()),
                };
                spec.ivf == Some(ivf.nlist()) && spec.encoding == leaf
            }
            _ if spec.ivf.is_some() => false,
            Structure::Flat(_) => spec.encoding == Encoding::Flat,
            Structure::Pq(pq) => {
                spec.encoding
                    == Encoding::Pq {
                        m: pq.quantizer().code_size(),
                        nbits: pq.quantizer().nbits(),
                    }
            }
            Structure::Sq(sq) => spec.encoding == Encoding::Sq(sq.quantizer().kind()),
        }
    }
}

impl VectorStructure for Structure {
    fn family(&self) -> &'static str {
        delegate!(self, s => s.family())
    }

    fn dimension(&self) -> usize {
        delegate!(self, s => s.dimension())
    }

    fn metric(&self) -> Metric {
        delegate!(self, s => s.metric())
    }

    fn is_trained(&self) -> bool {
        delegate!(self, s => s.is_trained())
    }

    fn ntotal(&self) -> usize {
        delegate!(self, s => s.ntotal())
    }

    fn train(&mut self, vectors: &[f32]) -> Result<()> {
        delegate!(self, s => s.train(vectors))
    }

    fn add(&mut self, vectors: &[f32]) -> Result<()> {
        delegate!(self, s => s.add(vectors))
    }

    fn add_with_ids(&mut self, vectors: &[f32], ids: &[VectorId]) -> Result<()> {
        delegate!(self, s => s.add_with_ids(vectors, ids))
    }

    fn search_one(&self, query: &[f32], k: usize) -> Vec<(VectorId, f32)> {
        delegate!(self, s => s.search_one(query, k))
    }

    fn reconstruct(&self, id: VectorId, out: &mut [f32]) -> Result<()> {
        delegate!(self, s => s.reconstruct(id, out))
    }

    fn reset(&mut self) {
        delegate!(self, s => s.reset())
    }

    fn encodes_with_training(&self) -> bool {
        delegate!(self, s => s.encodes_with_training())
    }

    fn check_invariants(&self) -> Result<()> {
        delegate!(self, s => s.check_invariants())
    }
}
