//! Opaque handle table for exposing engine objects to a host runtime.
//!
//! Handles are engine-assigned integers, never addresses. Releasing a handle
//! removes it from the table; the object is dropped once the last in-flight
//! operation holding it finishes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clustering::ClusteringState;
use crate::error::{QuiverError, Result};
use crate::index::Index;
use crate::metrics::LIVE_HANDLES;

pub type Handle = u64;

pub type SharedIndex = Arc<Mutex<Index>>;
pub type SharedClustering = Arc<Mutex<ClusteringState>>;

lazy_static::lazy_static! {
    static ref GLOBAL: Registry = Registry::new();
}

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

#[derive(Debug)]
pub struct Registry {
    next: AtomicU64,
    indexes: DashMap<Handle, SharedIndex>,
    clusterings: DashMap<Handle, SharedClustering>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            // 0 is never handed out so hosts can use it as "no handle".
            next: AtomicU64::new(1),
            indexes: DashMap::new(),
            clusterings: DashMap::new(),
        }
    }

    fn next_handle(&self) -> Handle {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert_index(&self, index: Index) -> Handle {
        let handle = self.next_handle();
        self.indexes.insert(handle, Arc::new(Mutex::new(index)));
        LIVE_HANDLES.with_label_values(&["index"]).inc();
        debug!(handle, "registered index");
        handle
    }

    pub fn index(&self, handle: Handle) -> Result<SharedIndex> {
        self.indexes
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(QuiverError::InvalidHandle { handle })
    }

    /// Returns `false` if the handle was unknown or already released.
    pub fn release_index(&self, handle: Handle) -> bool {
        let released = self.indexes.remove(&handle).is_some();
        if released {
            LIVE_HANDLES.with_label_values(&["index"]).dec();
            debug!(handle, "released index");
        }
        released
    }

    pub fn insert_clustering(&self, state: ClusteringState) -> Handle {
        let handle = self.next_handle();
        self.clusterings.insert(handle, Arc::new(Mutex::new(state)));
        LIVE_HANDLES.with_label_values(&["clustering"]).inc();
        debug!(handle, "registered clustering");
        handle
    }

    pub fn clustering(&self, handle: Handle) -> Result<SharedClustering> {
        self.clusterings
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or(QuiverError::InvalidHandle { handle })
    }

    pub fn release_clustering(&self, handle: Handle) -> bool {
        let released = self.clusterings.remove(&handle).is_some();
        if released {
            LIVE_HANDLES.with_label_values(&["clustering"]).dec();
            debug!(handle, "released clustering");
        }
        released
    }

    pub fn live_indexes(&self) -> usize {
        self.indexes.len()
    }

    pub fn live_clusterings(&self) -> usize {
        self.clusterings.len()
    }
}
