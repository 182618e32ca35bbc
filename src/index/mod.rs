//! Index module for Quiver.
//!
//! `Index` is the shell callers use. It owns one `Structure` built from a
//! factory description; every structure implements `VectorStructure`.

pub mod distance;
pub mod engine;
pub mod factory;
pub mod flat;
pub mod id_map;
pub mod ivf;
pub mod pq;
pub mod sq;
pub mod structure;
pub mod topk;
pub mod traits;

pub use engine::{Index, SearchOutput};
pub use factory::{Encoding, IndexSpec};
pub use structure::Structure;
pub use traits::VectorStructure;
