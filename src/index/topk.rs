//! Bounded top-k collection shared by every structure's search path.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::types::{Metric, VectorId, EMPTY_LABEL};

/// A candidate keyed so that "greater" means "ranks later".
///
/// Similarities are negated so both metric families share one ordering;
/// ties fall back to the smaller id.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    key: f32,
    id: VectorId,
    score: f32,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Keeps the best `k` candidates seen so far. The heap top is the current worst.
pub struct TopK {
    k: usize,
    metric: Metric,
    heap: BinaryHeap<Ranked>,
}

impl TopK {
    pub fn new(k: usize, metric: Metric) -> Self {
        Self {
            k,
            metric,
            heap: BinaryHeap::with_capacity(k + 1),
        }
    }

    pub fn push(&mut self, id: VectorId, score: f32) {
        if self.k == 0 {
            return;
        }
        let key = if self.metric.is_similarity() {
            -score
        } else {
            score
        };
        let candidate = Ranked { key, id, score };
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if let Some(worst) = self.heap.peek() {
            if candidate < *worst {
                self.heap.pop();
                self.heap.push(candidate);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Results best-first.
    pub fn into_sorted(self) -> Vec<(VectorId, f32)> {
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|r| (r.id, r.score))
            .collect()
    }
}

/// Write best-first `hits` into one query's output row, padding with sentinels.
pub fn fill_row(
    hits: &[(VectorId, f32)],
    metric: Metric,
    distances: &mut [f32],
    labels: &mut [VectorId],
) {
    for (slot, (d, l)) in distances.iter_mut().zip(labels.iter_mut()).enumerate() {
        match hits.get(slot) {
            Some(&(id, score)) => {
                *d = score;
                *l = id;
            }
            None => {
                *d = metric.sentinel();
                *l = EMPTY_LABEL;
            }
        }
    }
}
