use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{QuiverError, Result};

/// Identifier assigned to a stored vector. `-1` marks an empty search slot.
pub type VectorId = i64;

/// Label written into search slots that have no candidate.
pub const EMPTY_LABEL: VectorId = -1;

/// Distance or similarity function used to rank search results.
///
/// Numeric codes follow the kernel library's numbering so hosts can pass
/// metrics as plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InnerProduct,
    L2,
    L1,
    Linf,
}

impl Metric {
    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Metric::InnerProduct),
            1 => Ok(Metric::L2),
            2 => Ok(Metric::L1),
            3 => Ok(Metric::Linf),
            other => Err(QuiverError::construction(
                "metric",
                format!("unsupported metric code {other}"),
            )),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Metric::InnerProduct => 0,
            Metric::L2 => 1,
            Metric::L1 => 2,
            Metric::Linf => 3,
        }
    }

    /// True when larger values rank first.
    pub fn is_similarity(self) -> bool {
        matches!(self, Metric::InnerProduct)
    }

    /// Value written into search slots that have no candidate.
    pub fn sentinel(self) -> f32 {
        if self.is_similarity() {
            -f32::MAX
        } else {
            f32::MAX
        }
    }

    /// Whether score `a` ranks strictly ahead of `b` under this metric.
    #[inline]
    pub fn better<T: PartialOrd>(self, a: T, b: T) -> bool {
        if self.is_similarity() {
            a > b
        } else {
            a < b
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::InnerProduct => write!(f, "inner_product"),
            Metric::L2 => write!(f, "l2"),
            Metric::L1 => write!(f, "l1"),
            Metric::Linf => write!(f, "linf"),
        }
    }
}

impl FromStr for Metric {
    type Err = QuiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner_product" | "ip" => Ok(Metric::InnerProduct),
            "l2" => Ok(Metric::L2),
            "l1" => Ok(Metric::L1),
            "linf" => Ok(Metric::Linf),
            other => Err(QuiverError::construction(
                "metric",
                format!("unknown metric '{other}'"),
            )),
        }
    }
}

/// `count * width` elements, or a `Dimension` error for `op` when the
/// product does not fit in `usize`.
pub fn buffer_len(op: &'static str, count: usize, width: usize) -> Result<usize> {
    count.checked_mul(width).ok_or_else(|| {
        QuiverError::dimension(op, format!("{count} x {width} elements overflows usize"))
    })
}

/// Memory domain an index's structure lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Residency {
    #[default]
    Host,
    Device(u32),
}

impl std::fmt::Display for Residency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Residency::Host => write!(f, "host"),
            Residency::Device(id) => write!(f, "device:{id}"),
        }
    }
}

/// Load-behaviour flags for reading a serialized index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoFlags {
    bits: u32,
}

impl IoFlags {
    /// Map the file instead of reading it fully. Content is identical either way.
    pub const MMAP: u32 = 1 << 0;
    /// Reject mutating operations on the loaded index.
    pub const READ_ONLY: u32 = 1 << 1;

    const KNOWN: u32 = Self::MMAP | Self::READ_ONLY;

    pub fn new(bits: u32) -> Result<Self> {
        if bits & !Self::KNOWN != 0 {
            return Err(QuiverError::unsupported(
                "read_index",
                format!("unknown io flag bits {:#x}", bits & !Self::KNOWN),
            ));
        }
        Ok(Self { bits })
    }

    pub fn none() -> Self {
        Self { bits: 0 }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn has(&self, flag: u32) -> bool {
        self.bits & flag != 0
    }
}
