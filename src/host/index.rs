use std::path::PathBuf;

use bytes::Bytes;
use tokio::sync::OwnedMutexGuard;
use tracing::instrument;

use crate::error::Result;
use crate::index::Index;
use crate::registry::{Handle, Registry};
use crate::schedule;
use crate::transport::{decode_f32, decode_ids, encode_f32, encode_ids};
use crate::types::{buffer_len, IoFlags, Metric};

/// Encoded search results: `n * k` native-endian floats and ids.
#[derive(Debug, Clone)]
pub struct SearchBuffers {
    pub distances: Bytes,
    pub labels: Bytes,
}

async fn lock(registry: &Registry, handle: Handle) -> Result<OwnedMutexGuard<Index>> {
    Ok(registry.index(handle)?.lock_owned().await)
}

#[instrument(skip(registry))]
pub async fn create_index(
    registry: &Registry,
    dimension: usize,
    description: String,
    metric: i32,
) -> Result<Handle> {
    let metric = Metric::from_code(metric)?;
    let index = schedule::run("new_index", move || {
        Index::new(dimension, &description, metric)
    })
    .await?;
    Ok(registry.insert_index(index))
}

pub async fn clone_index(registry: &Registry, handle: Handle) -> Result<Handle> {
    let guard = lock(registry, handle).await?;
    let copy = schedule::run("clone", move || Ok(guard.clone())).await?;
    Ok(registry.insert_index(copy))
}

#[instrument(skip(registry))]
pub async fn clone_to_gpu(registry: &Registry, handle: Handle, device: i32) -> Result<Handle> {
    let guard = lock(registry, handle).await?;
    let copy = schedule::run("clone_to_gpu", move || guard.clone_to_gpu(device)).await?;
    Ok(registry.insert_index(copy))
}

pub async fn clone_to_host(registry: &Registry, handle: Handle) -> Result<Handle> {
    let guard = lock(registry, handle).await?;
    let copy = schedule::run("clone_to_host", move || Ok(guard.clone_to_host())).await?;
    Ok(registry.insert_index(copy))
}

pub fn release_index(registry: &Registry, handle: Handle) -> bool {
    registry.release_index(handle)
}

#[instrument(skip(registry, vectors))]
pub async fn train(registry: &Registry, handle: Handle, n: usize, vectors: Bytes) -> Result<()> {
    let mut guard = lock(registry, handle).await?;
    let len = buffer_len("train", n, guard.dim())?;
    let vectors = decode_f32("train", &vectors, len)?;
    schedule::run("train", move || guard.train(n, &vectors)).await
}

#[instrument(skip(registry, vectors))]
pub async fn add(registry: &Registry, handle: Handle, n: usize, vectors: Bytes) -> Result<()> {
    let mut guard = lock(registry, handle).await?;
    let len = buffer_len("add", n, guard.dim())?;
    let vectors = decode_f32("add", &vectors, len)?;
    schedule::run("add", move || guard.add(n, &vectors)).await
}

#[instrument(skip(registry, vectors, ids))]
pub async fn add_with_ids(
    registry: &Registry,
    handle: Handle,
    n: usize,
    vectors: Bytes,
    ids: Bytes,
) -> Result<()> {
    let mut guard = lock(registry, handle).await?;
    let len = buffer_len("add_with_ids", n, guard.dim())?;
    let vectors = decode_f32("add_with_ids", &vectors, len)?;
    let ids = decode_ids("add_with_ids", &ids, n)?;
    schedule::run("add_with_ids", move || guard.add_with_ids(n, &vectors, &ids)).await
}

#[instrument(skip(registry, queries))]
pub async fn search(
    registry: &Registry,
    handle: Handle,
    n: usize,
    queries: Bytes,
    k: usize,
) -> Result<SearchBuffers> {
    let guard = lock(registry, handle).await?;
    let len = buffer_len("search", n, guard.dim())?;
    let queries = decode_f32("search", &queries, len)?;
    let out = schedule::run("search", move || guard.search(n, &queries, k)).await?;
    Ok(SearchBuffers {
        distances: encode_f32(&out.distances),
        labels: encode_ids(&out.labels),
    })
}

pub async fn reset(registry: &Registry, handle: Handle) -> Result<()> {
    let mut guard = lock(registry, handle).await?;
    schedule::run("reset", move || guard.reset()).await
}

pub async fn reconstruct_batch(
    registry: &Registry,
    handle: Handle,
    n: usize,
    keys: Bytes,
) -> Result<Bytes> {
    let guard = lock(registry, handle).await?;
    let keys = decode_ids("reconstruct_batch", &keys, n)?;
    let out = schedule::run("reconstruct_batch", move || guard.reconstruct_batch(n, &keys)).await?;
    Ok(encode_f32(&out))
}

pub async fn compute_residuals(
    registry: &Registry,
    handle: Handle,
    n: usize,
    vectors: Bytes,
    keys: Bytes,
) -> Result<Bytes> {
    let guard = lock(registry, handle).await?;
    let len = buffer_len("compute_residuals", n, guard.dim())?;
    let vectors = decode_f32("compute_residuals", &vectors, len)?;
    let keys = decode_ids("compute_residuals", &keys, n)?;
    let out = schedule::run("compute_residuals", move || {
        guard.compute_residuals(n, &vectors, &keys)
    })
    .await?;
    Ok(encode_f32(&out))
}

pub async fn set_nprobe(registry: &Registry, handle: Handle, nprobe: usize) -> Result<()> {
    let mut guard = lock(registry, handle).await?;
    guard.set_nprobe(nprobe)
}

pub async fn dim(registry: &Registry, handle: Handle) -> Result<usize> {
    Ok(lock(registry, handle).await?.dim())
}

pub async fn n_total(registry: &Registry, handle: Handle) -> Result<usize> {
    Ok(lock(registry, handle).await?.n_total())
}

pub async fn is_trained(registry: &Registry, handle: Handle) -> Result<bool> {
    Ok(lock(registry, handle).await?.is_trained())
}

#[instrument(skip(registry))]
pub async fn write_index(registry: &Registry, handle: Handle, path: PathBuf) -> Result<()> {
    let guard = lock(registry, handle).await?;
    schedule::run("write_index", move || guard.write_to_file(&path)).await
}

#[instrument(skip(registry))]
pub async fn read_index(registry: &Registry, path: PathBuf, flags: u32) -> Result<Handle> {
    let flags = IoFlags::new(flags)?;
    let index = schedule::run("read_index", move || Index::read_from_file(&path, flags)).await?;
    Ok(registry.insert_index(index))
}
