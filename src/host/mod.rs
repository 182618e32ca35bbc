//! Async entry points for a host runtime.
//!
//! Each call takes handles, raw native-endian buffers and explicit counts,
//! resolves handles through a [`Registry`](crate::registry::Registry),
//! decodes buffers with [`crate::transport`], and runs the engine operation
//! under its [`crate::schedule`] cost class. A handle's lock is taken before
//! the work is scheduled, so calls on one object are serialized while calls
//! on different objects run in parallel.

pub mod clustering;
pub mod index;

pub use clustering::{centroids, new_clustering, release_clustering, train_clustering};
pub use index::{
    add, add_with_ids, clone_index, clone_to_gpu, clone_to_host, compute_residuals, create_index,
    dim, is_trained, n_total, read_index, reconstruct_batch, release_index, reset, search,
    set_nprobe, train, write_index, SearchBuffers,
};

/// Accelerator devices available to this process.
pub fn device_count() -> u32 {
    crate::residency::device_count()
}
