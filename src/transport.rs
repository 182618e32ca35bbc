//! Raw buffer encoding at the host boundary.
//!
//! Vectors cross as native-endian `f32` arrays and identifiers as
//! native-endian `i64` arrays, always with an explicit element count.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{QuiverError, Result};
use crate::types::{buffer_len, VectorId};

fn check_len(op: &'static str, bytes: &[u8], count: usize, width: usize) -> Result<()> {
    let expected = buffer_len(op, count, width)?;
    if bytes.len() != expected {
        return Err(QuiverError::dimension(
            op,
            format!(
                "expected {count} x {width} = {expected} bytes, got {}",
                bytes.len()
            ),
        ));
    }
    Ok(())
}

/// Decode `count` floats.
pub fn decode_f32(op: &'static str, bytes: &[u8], count: usize) -> Result<Vec<f32>> {
    check_len(op, bytes, count, 4)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Decode `count` identifiers.
pub fn decode_ids(op: &'static str, bytes: &[u8], count: usize) -> Result<Vec<VectorId>> {
    check_len(op, bytes, count, 8)?;
    Ok(bytes
        .chunks_exact(8)
        .map(|c| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(c);
            VectorId::from_ne_bytes(raw)
        })
        .collect())
}

pub fn encode_f32(values: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 4);
    for &v in values {
        buf.put_f32_ne(v);
    }
    buf.freeze()
}

pub fn encode_ids(values: &[VectorId]) -> Bytes {
    let mut buf = BytesMut::with_capacity(values.len() * 8);
    for &v in values {
        buf.put_i64_ne(v);
    }
    buf.freeze()
}
