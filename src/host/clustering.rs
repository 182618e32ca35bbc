use bytes::Bytes;
use tracing::instrument;

use crate::clustering::ClusteringState;
use crate::error::Result;
use crate::registry::{Handle, Registry};
use crate::schedule;
use crate::transport::{decode_f32, encode_f32};
use crate::types::buffer_len;

pub async fn new_clustering(registry: &Registry, d: usize, k: usize) -> Result<Handle> {
    let state = schedule::run("new_clustering", move || ClusteringState::new(d, k)).await?;
    Ok(registry.insert_clustering(state))
}

/// Train clustering `handle` on `n` vectors, using index `quantizer` for
/// assignment. The clustering lock is always taken before the index lock.
#[instrument(skip(registry, vectors))]
pub async fn train_clustering(
    registry: &Registry,
    handle: Handle,
    n: usize,
    vectors: Bytes,
    quantizer: Handle,
) -> Result<()> {
    let mut state = registry.clustering(handle)?.lock_owned().await;
    let mut index = registry.index(quantizer)?.lock_owned().await;
    let len = buffer_len("train_clustering", n, state.dimension())?;
    let vectors = decode_f32("train_clustering", &vectors, len)?;
    schedule::run("train_clustering", move || {
        state.train(n, &vectors, &mut index)
    })
    .await
}

pub async fn centroids(registry: &Registry, handle: Handle) -> Result<Bytes> {
    let state = registry.clustering(handle)?.lock_owned().await;
    Ok(encode_f32(state.centroids()))
}

pub fn release_clustering(registry: &Registry, handle: Handle) -> bool {
    registry.release_clustering(handle)
}
