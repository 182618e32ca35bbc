//! Lossless serialization of an [`Index`] to a versioned, checksummed
//! byte stream.

pub mod format;

use std::path::Path;

use bincode::Options;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{QuiverError, Result};
use crate::index::factory::IndexSpec;
use crate::index::structure::Structure;
use crate::index::traits::VectorStructure;
use crate::index::Index;
use crate::metrics::observe;
use crate::types::{IoFlags, Metric, Residency};

pub use format::{FileHeader, FORMAT_VERSION, MAGIC};

#[derive(Deserialize)]
struct PersistedIndex {
    description: String,
    metric: Metric,
    dimension: u64,
    structure: Structure,
}

/// Borrowed twin of [`PersistedIndex`]; both encode to the same bytes.
#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    description: &'a str,
    metric: Metric,
    dimension: u64,
    structure: &'a Structure,
}

fn payload_options(limit: u64) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(limit)
}

/// Serialize `index` to header + payload bytes.
pub fn encode(index: &Index) -> Result<Vec<u8>> {
    let persisted = PersistedIndexRef {
        description: index.description(),
        metric: index.metric(),
        dimension: index.dim() as u64,
        structure: index.structure(),
    };
    let payload = payload_options(u64::MAX)
        .serialize(&persisted)
        .map_err(|e| QuiverError::Internal(format!("serializing index: {e}")))?;

    let header = FileHeader::for_payload(&payload);
    let mut out = Vec::with_capacity(FileHeader::SIZE + payload.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Rebuild an index from bytes produced by [`encode`]. The result is always
/// host-resident.
pub fn decode(bytes: &[u8], flags: IoFlags) -> Result<Index> {
    let header = FileHeader::from_bytes(bytes)?;
    let payload = &bytes[FileHeader::SIZE..];
    header.verify_payload(payload)?;

    let persisted: PersistedIndex = payload_options(header.payload_len).deserialize(payload)?;
    check_persisted(&persisted)?;

    Ok(Index::from_parts(
        persisted.description,
        persisted.metric,
        persisted.structure,
        Residency::Host,
        flags.has(IoFlags::READ_ONLY),
    ))
}

/// The stored description, dimension, metric and structure must agree with
/// each other, and the structure must be internally consistent.
fn check_persisted(persisted: &PersistedIndex) -> Result<()> {
    let dimension = usize::try_from(persisted.dimension)
        .map_err(|_| QuiverError::corrupt(format!("dimension {} out of range", persisted.dimension)))?;
    let spec = IndexSpec::parse(&persisted.description)
        .and_then(|spec| spec.validate(dimension, persisted.metric).map(|()| spec))
        .map_err(|e| QuiverError::corrupt(format!("stored description: {e}")))?;

    let structure = &persisted.structure;
    if structure.dimension() != dimension || structure.metric() != persisted.metric {
        return Err(QuiverError::corrupt(
            "structure does not match stored dimension or metric",
        ));
    }
    if !structure.matches_spec(&spec) {
        return Err(QuiverError::corrupt(format!(
            "structure is not a '{}' index",
            persisted.description
        )));
    }
    structure.check_invariants()
}

#[instrument(skip(index), fields(path = %path.display(), n_total = index.n_total()))]
pub fn write_to_file(index: &Index, path: &Path) -> Result<()> {
    observe("write_index", || {
        let bytes = encode(index)?;
        std::fs::write(path, &bytes)?;
        debug!(bytes = bytes.len(), "wrote index");
        Ok(())
    })
}

#[instrument(fields(path = %path.display(), flags = flags.bits()))]
pub fn read_from_file(path: &Path, flags: IoFlags) -> Result<Index> {
    observe("read_index", || {
        // Memory mapping is a load hint; the content is the same either way.
        let bytes = std::fs::read(path)?;
        let index = decode(&bytes, flags)?;
        debug!(
            n_total = index.n_total(),
            mmap = flags.has(IoFlags::MMAP),
            read_only = index.is_read_only(),
            "read index"
        );
        Ok(index)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::factory;
    use crate::index::flat::FlatStructure;
    use crate::index::id_map::IdMapStructure;

    /// Frame an arbitrary structure the way `encode` frames an index.
    fn framed(description: &str, metric: Metric, dimension: u64, structure: &Structure) -> Vec<u8> {
        let payload = payload_options(u64::MAX)
            .serialize(&PersistedIndexRef {
                description,
                metric,
                dimension,
                structure,
            })
            .unwrap();
        let mut out = FileHeader::for_payload(&payload).to_bytes().to_vec();
        out.extend_from_slice(&payload);
        out
    }

    fn assert_corrupt(bytes: &[u8]) {
        let err = decode(bytes, IoFlags::none()).unwrap_err();
        assert!(matches!(err, QuiverError::CorruptData(_)), "{err:?}");
    }

    #[test]
    fn test_roundtrip_preserves_attributes() {
        let mut index = Index::new(2, "Flat", Metric::InnerProduct).unwrap();
        index.add(2, &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let back = decode(&encode(&index).unwrap(), IoFlags::none()).unwrap();
        assert_eq!(back.dim(), 2);
        assert_eq!(back.n_total(), 2);
        assert_eq!(back.metric(), Metric::InnerProduct);
        assert_eq!(back.description(), "Flat");
        assert!(!back.is_read_only());
    }

    #[test]
    fn test_truncated_stream_is_corrupt() {
        let index = Index::new(2, "Flat", Metric::L2).unwrap();
        let bytes = encode(&index).unwrap();
        for cut in [0, 7, FileHeader::SIZE, bytes.len() - 1] {
            let err = decode(&bytes[..cut], IoFlags::none()).unwrap_err();
            assert!(matches!(err, QuiverError::CorruptData(_)), "cut at {cut}: {err:?}");
        }
    }

    #[test]
    fn test_zero_dimension_is_corrupt() {
        let flat = Structure::Flat(FlatStructure::new(0, Metric::L2));
        assert_corrupt(&framed("Flat", Metric::L2, 0, &flat));
    }

    #[test]
    fn test_description_must_match_structure() {
        let flat = factory::build("Flat", 8, Metric::L2).unwrap();
        assert_corrupt(&framed("IVF4,PQ2", Metric::L2, 8, &flat));

        let pq = factory::build("PQ4x4", 8, Metric::L2).unwrap();
        assert_corrupt(&framed("PQ4", Metric::L2, 8, &pq));

        let ivf = factory::build("IDMap,IVF4,SQ8", 8, Metric::L2).unwrap();
        assert_corrupt(&framed("IVF4,SQ8", Metric::L2, 8, &ivf));
        assert!(decode(&framed("IDMap,IVF4,SQ8", Metric::L2, 8, &ivf), IoFlags::none()).is_ok());
    }

    #[test]
    fn test_ragged_flat_data_is_corrupt() {
        let mut flat = FlatStructure::new(2, Metric::L2);
        flat.add(&[1.0, 2.0, 3.0]).unwrap();
        assert_corrupt(&framed("Flat", Metric::L2, 2, &Structure::Flat(flat)));
    }

    #[test]
    fn test_id_map_without_ids_is_corrupt() {
        let mut flat = FlatStructure::new(2, Metric::L2);
        flat.add(&[1.0, 2.0]).unwrap();
        let map = Structure::IdMap(IdMapStructure::new(Structure::Flat(flat)));
        assert_corrupt(&framed("IDMap,Flat", Metric::L2, 2, &map));
    }
}
