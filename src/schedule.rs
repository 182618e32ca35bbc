//! Cost classes for host calls.
//!
//! CPU- and IO-bound work is moved off the async executor onto tokio's
//! blocking pool so it cannot stall latency-sensitive tasks. Cheap metadata
//! calls run inline.

use crate::error::{QuiverError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostClass {
    Cheap,
    CpuBound,
    IoBound,
}

/// Cost class of a host operation by name.
pub fn classify(op: &str) -> CostClass {
    match op {
        "write_index" | "read_index" | "clone_to_gpu" => CostClass::IoBound,
        "add" | "add_with_ids" | "search" | "train" | "new_clustering" | "train_clustering" => {
            CostClass::CpuBound
        }
        _ => CostClass::Cheap,
    }
}

/// Run `f` according to the cost class of `op`.
pub async fn run<T, F>(op: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match classify(op) {
        CostClass::Cheap => f(),
        class => {
            let span = tracing::debug_span!("blocking", op, class = ?class);
            tokio::task::spawn_blocking(move || span.in_scope(f))
                .await
                .map_err(|e| QuiverError::Internal(format!("{op} worker failed: {e}")))?
        }
    }
}
