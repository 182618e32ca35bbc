//! Quiver: trainable vector index engine with portable serialization and
//! host/accelerator residency.

pub mod clustering;
pub mod codec;
pub mod config;
pub mod error;
pub mod host;
pub mod index;
pub mod metrics;
pub mod registry;
pub mod residency;
pub mod runtime;
pub mod schedule;
pub mod transport;
pub mod types;

pub use clustering::{ClusteringState, IterationStats};
pub use error::{QuiverError, Result};
pub use index::{Index, SearchOutput};
pub use residency::{DeviceBackend, HostOnly, ResidencyMigrator};
pub use types::{IoFlags, Metric, Residency, VectorId, EMPTY_LABEL};
