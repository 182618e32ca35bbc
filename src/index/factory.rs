//! Parse index descriptions such as `"IDMap,IVF64,PQ8x4"` into an
//! [`IndexSpec`] and build the matching [`Structure`].

use std::str::FromStr;

use crate::error::{QuiverError, Result};
use crate::index::flat::FlatStructure;
use crate::index::id_map::IdMapStructure;
use crate::index::ivf::{IvfStructure, ListCodec};
use crate::index::pq::{PqStructure, ProductQuantizer};
use crate::index::sq::{ScalarQuantizer, SqKind, SqStructure};
use crate::index::structure::Structure;
use crate::types::Metric;

const DEFAULT_NBITS: u32 = 8;

/// How vectors are encoded at the leaf of a description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Flat,
    Pq { m: usize, nbits: u32 },
    Sq(SqKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub id_map: bool,
    /// Number of inverted lists when the description starts with `IVF`.
    pub ivf: Option<usize>,
    pub encoding: Encoding,
}

impl IndexSpec {
    pub fn parse(description: &str) -> Result<Self> {
        let mut tokens = description.split(',').map(str::trim).peekable();

        let id_map = tokens.peek() == Some(&"IDMap");
        if id_map {
            tokens.next();
        }

        let first = tokens
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| QuiverError::construction("create", "empty index description"))?;

        let (ivf, encoding) = match first.strip_prefix("IVF") {
            Some(nlist) => {
                let nlist = parse_number::<usize>(nlist, first)?;
                if nlist == 0 {
                    return Err(QuiverError::construction("create", "IVF needs at least one list"));
                }
                let leaf = tokens.next().ok_or_else(|| {
                    QuiverError::construction("create", format!("'{first}' must be followed by an encoding"))
                })?;
                (Some(nlist), parse_encoding(leaf)?)
            }
            None => (None, parse_encoding(first)?),
        };

        if let Some(extra) = tokens.next() {
            return Err(QuiverError::construction(
                "create",
                format!("unexpected component '{extra}' in '{description}'"),
            ));
        }

        Ok(Self {
            id_map,
            ivf,
            encoding,
        })
    }

    /// Check that this description can hold `dimension`-sized vectors under
    /// `metric`.
    pub fn validate(&self, dimension: usize, metric: Metric) -> Result<()> {
        if dimension == 0 {
            return Err(QuiverError::construction("create", "dimension must be positive"));
        }
        if matches!(metric, Metric::L1 | Metric::Linf)
            && (self.ivf.is_some() || self.encoding != Encoding::Flat)
        {
            return Err(QuiverError::construction(
                "create",
                format!("metric {metric} is only supported by Flat structures"),
            ));
        }
        if let Encoding::Pq { m, nbits } = self.encoding {
            if m == 0 || dimension % m != 0 {
                return Err(QuiverError::construction(
                    "create",
                    format!("PQ{m} does not divide dimension {dimension}"),
                ));
            }
            if !(1..=8).contains(&nbits) {
                return Err(QuiverError::construction(
                    "create",
                    format!("PQ code width must be 1..=8 bits, got {nbits}"),
                ));
            }
        }
        Ok(())
    }

    /// Validate against a dimension and metric, then construct the
    /// empty structure it describes.
    pub fn build(&self, dimension: usize, metric: Metric) -> Result<Structure> {
        self.validate(dimension, metric)?;

        let structure = match self.ivf {
            Some(nlist) => {
                let codec = match self.encoding {
                    Encoding::Flat => ListCodec::Flat,
                    Encoding::Pq { m, nbits } => ListCodec::Pq(ProductQuantizer::new(dimension, m, nbits)),
                    Encoding::Sq(kind) => ListCodec::Sq(ScalarQuantizer::new(kind, dimension)),
                };
                Structure::Ivf(IvfStructure::new(dimension, metric, nlist, codec))
            }
            None => match self.encoding {
                Encoding::Flat => Structure::Flat(FlatStructure::new(dimension, metric)),
                Encoding::Pq { m, nbits } => Structure::Pq(PqStructure::new(dimension, metric, m, nbits)),
                Encoding::Sq(kind) => Structure::Sq(SqStructure::new(dimension, metric, kind)),
            },
        };

        Ok(if self.id_map {
            Structure::IdMap(IdMapStructure::new(structure))
        } else {
            structure
        })
    }
}

/// Parse and build in one step.
pub fn build(description: &str, dimension: usize, metric: Metric) -> Result<Structure> {
    IndexSpec::parse(description)?.build(dimension, metric)
}

fn parse_encoding(token: &str) -> Result<Encoding> {
    match token {
        "Flat" => Ok(Encoding::Flat),
        "SQ8" => Ok(Encoding::Sq(SqKind::Q8)),
        "SQfp16" => Ok(Encoding::Sq(SqKind::Fp16)),
        _ => {
            let rest = token.strip_prefix("PQ").ok_or_else(|| {
                QuiverError::construction("create", format!("unknown index component '{token}'"))
            })?;
            let (m, nbits) = match rest.split_once('x') {
                Some((m, nbits)) => (
                    parse_number::<usize>(m, token)?,
                    parse_number::<u32>(nbits, token)?,
                ),
                None => (parse_number(rest, token)?, DEFAULT_NBITS),
            };
            Ok(Encoding::Pq { m, nbits })
        }
    }
}

fn parse_number<T: FromStr>(digits: &str, token: &str) -> Result<T> {
    digits
        .parse()
        .map_err(|_| QuiverError::construction("create", format!("invalid number in '{token}'")))
}
