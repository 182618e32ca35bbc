//! k-means clustering driven by any index used as the assignment quantizer.
//!
//! Implements Lloyd's algorithm: seed centroids from a random sample of the
//! input, then alternate nearest-centroid assignment (a 1-NN search against
//! the quantizer) with mean updates. Empty clusters are re-seeded by
//! splitting the largest cluster.

use std::borrow::Cow;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::ClusteringConfig;
use crate::error::{QuiverError, Result};
use crate::index::distance::normalize;
use crate::index::traits::VectorStructure;
use crate::index::Index;
use crate::types::buffer_len;

/// Relative perturbation applied when splitting a cluster.
const SPLIT_EPS: f32 = 1.0 / 1024.0;

/// Diagnostics recorded once per Lloyd iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// Sum of assignment scores (squared distances or similarities).
    pub objective: f64,
    pub time_ms: f64,
    pub time_search_ms: f64,
    /// `k * sum(size^2) / n^2`; 1.0 means perfectly balanced.
    pub imbalance_factor: f64,
    /// Empty clusters re-seeded in this iteration.
    pub nsplit: usize,
}

#[derive(Debug)]
pub struct ClusteringState {
    d: usize,
    k: usize,
    config: ClusteringConfig,
    centroids: Vec<f32>,
    iteration_stats: Vec<IterationStats>,
}

impl ClusteringState {
    /// Create a trainer for `k` centroids in `d` dimensions using the
    /// process-wide clustering defaults.
    pub fn new(d: usize, k: usize) -> Result<Self> {
        Self::with_config(d, k, crate::runtime::settings().clustering.clone())
    }

    pub fn with_config(d: usize, k: usize, config: ClusteringConfig) -> Result<Self> {
        if d == 0 {
            return Err(QuiverError::construction(
                "clustering",
                "dimension must be positive, got 0",
            ));
        }
        if k == 0 {
            return Err(QuiverError::construction(
                "clustering",
                "k must be positive, got 0",
            ));
        }
        if config.niter == 0 || config.nredo == 0 {
            return Err(QuiverError::construction(
                "clustering",
                format!(
                    "niter and nredo must be positive, got {} and {}",
                    config.niter, config.nredo
                ),
            ));
        }
        let len = d.checked_mul(k).ok_or_else(|| {
            QuiverError::construction("clustering", format!("{k} centroids of dimension {d} overflow"))
        })?;
        Ok(Self {
            d,
            k,
            config,
            centroids: vec![0.0; len],
            iteration_stats: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.d
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn config(&self) -> &ClusteringConfig {
        &self.config
    }

    /// Current `k * d` centroid buffer, zero-filled before the first `train`.
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    pub fn iteration_stats(&self) -> &[IterationStats] {
        &self.iteration_stats
    }

    /// Compute `k` centroids from `n` vectors, using `quantizer` for
    /// nearest-centroid assignment. On success the quantizer is left holding
    /// the centroids as its only vectors.
    #[instrument(skip(self, vectors, quantizer), fields(d = self.d, k = self.k))]
    pub fn train(&mut self, n: usize, vectors: &[f32], quantizer: &mut Index) -> Result<()> {
        quantizer.ensure_mutable("clustering_train")?;
        if quantizer.dim() != self.d {
            return Err(QuiverError::dimension(
                "clustering_train",
                format!(
                    "quantizer dimension {} does not match clustering dimension {}",
                    quantizer.dim(),
                    self.d
                ),
            ));
        }
        crate::metrics::observe("clustering_train", || {
            self.train_with(n, vectors, quantizer.structure_mut())
        })
    }

    pub(crate) fn train_with(
        &mut self,
        n: usize,
        vectors: &[f32],
        quantizer: &mut dyn VectorStructure,
    ) -> Result<()> {
        let (d, k) = (self.d, self.k);
        if n == 0 {
            return Err(QuiverError::dimension(
                "clustering_train",
                "n must be positive, got 0",
            ));
        }
        let expected = buffer_len("clustering_train", n, d)?;
        if vectors.len() != expected {
            return Err(QuiverError::dimension(
                "clustering_train",
                format!("expected {n} x {d} = {expected} floats, got {}", vectors.len()),
            ));
        }
        if n < k {
            return Err(QuiverError::dimension(
                "clustering_train",
                format!("need at least k = {k} training points, got {n}"),
            ));
        }
        if quantizer.dimension() != d {
            return Err(QuiverError::dimension(
                "clustering_train",
                format!(
                    "quantizer dimension {} does not match {d}",
                    quantizer.dimension()
                ),
            ));
        }

        let points = self.subsample(n, vectors);
        let n_used = points.len() / d;
        let metric = quantizer.metric();

        self.iteration_stats.clear();
        let mut best: Option<(f64, Vec<f32>)> = None;

        for redo in 0..self.config.nredo {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(redo as u64));
            let mut centroids = Vec::with_capacity(k * d);
            for idx in sample(&mut rng, n_used, k).into_iter() {
                centroids.extend_from_slice(&points[idx * d..(idx + 1) * d]);
            }

            let mut objective = 0.0f64;
            for iter in 0..self.config.niter {
                let started = Instant::now();

                quantizer.reset();
                if !quantizer.is_trained() {
                    quantizer.train(&centroids)?;
                }
                quantizer.add(&centroids)?;

                let search_started = Instant::now();
                let mut assign = Vec::with_capacity(n_used);
                objective = 0.0;
                for row in points.chunks_exact(d) {
                    let (id, score) = quantizer
                        .search_one(row, 1)
                        .first()
                        .copied()
                        .ok_or_else(|| {
                            QuiverError::Internal("quantizer returned no assignment".into())
                        })?;
                    if id < 0 || id as usize >= k {
                        return Err(QuiverError::Internal(format!(
                            "quantizer assigned out-of-range centroid {id}"
                        )));
                    }
                    assign.push(id as usize);
                    objective += score as f64;
                }
                let time_search_ms = search_started.elapsed().as_secs_f64() * 1e3;

                let mut counts = update_means(&points, &assign, d, k, &mut centroids);
                let nsplit = split_empty_clusters(&mut centroids, &mut counts, d);
                if self.config.spherical {
                    for c in centroids.chunks_exact_mut(d) {
                        normalize(c);
                    }
                }

                let sq_sum: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
                let stats = IterationStats {
                    objective,
                    time_ms: started.elapsed().as_secs_f64() * 1e3,
                    time_search_ms,
                    imbalance_factor: sq_sum * k as f64 / (n_used as f64 * n_used as f64),
                    nsplit,
                };
                debug!(
                    redo,
                    iter,
                    objective = stats.objective,
                    imbalance = stats.imbalance_factor,
                    nsplit,
                    "clustering iteration"
                );
                self.iteration_stats.push(stats);
            }

            let improved = match &best {
                None => true,
                Some((b, _)) => metric.better(objective, *b),
            };
            if improved {
                best = Some((objective, centroids));
            }
        }

        let (objective, centroids) =
            best.ok_or_else(|| QuiverError::Internal("clustering produced no run".into()))?;

        quantizer.reset();
        if self.config.update_index || !quantizer.is_trained() {
            quantizer.train(&centroids)?;
        }
        quantizer.add(&centroids)?;
        self.centroids = centroids;

        debug!(n = n_used, objective, "clustering complete");
        Ok(())
    }

    fn subsample<'a>(&self, n: usize, vectors: &'a [f32]) -> Cow<'a, [f32]> {
        let d = self.d;
        let max = self.k.saturating_mul(self.config.max_points_per_centroid);
        if n > max {
            debug!(n, max, "subsampling clustering input");
            let mut rng = StdRng::seed_from_u64(self.config.seed);
            let mut picked = sample(&mut rng, n, max).into_vec();
            picked.sort_unstable();
            let mut out = Vec::with_capacity(max * d);
            for idx in picked {
                out.extend_from_slice(&vectors[idx * d..(idx + 1) * d]);
            }
            return Cow::Owned(out);
        }
        if n < self.k.saturating_mul(self.config.min_points_per_centroid) {
            warn!(
                n,
                k = self.k,
                min_per_centroid = self.config.min_points_per_centroid,
                "few training points per centroid"
            );
        }
        Cow::Borrowed(vectors)
    }
}

/// Replace every non-empty centroid with the mean of its members.
/// Returns per-cluster sizes.
fn update_means(
    points: &[f32],
    assign: &[usize],
    d: usize,
    k: usize,
    centroids: &mut [f32],
) -> Vec<usize> {
    let mut sums = vec![0.0f32; k * d];
    let mut counts = vec![0usize; k];
    for (row, &c) in points.chunks_exact(d).zip(assign) {
        counts[c] += 1;
        for (s, &x) in sums[c * d..(c + 1) * d].iter_mut().zip(row) {
            *s += x;
        }
    }
    for c in 0..k {
        if counts[c] > 0 {
            let inv = 1.0 / counts[c] as f32;
            for (dst, s) in centroids[c * d..(c + 1) * d]
                .iter_mut()
                .zip(&sums[c * d..(c + 1) * d])
            {
                *dst = s * inv;
            }
        }
    }
    counts
}

/// Re-seed empty clusters from a perturbed copy of the largest cluster.
fn split_empty_clusters(centroids: &mut [f32], counts: &mut [usize], d: usize) -> usize {
    let k = counts.len();
    let mut nsplit = 0;
    for ci in 0..k {
        if counts[ci] != 0 {
            continue;
        }
        let cj = (0..k)
            .max_by(|&a, &b| counts[a].cmp(&counts[b]).then_with(|| b.cmp(&a)))
            .unwrap_or(0);
        let source: Vec<f32> = centroids[cj * d..(cj + 1) * d].to_vec();
        for j in 0..d {
            let (up, down) = (1.0 + SPLIT_EPS, 1.0 - SPLIT_EPS);
            if j % 2 == 0 {
                centroids[ci * d + j] = source[j] * up;
                centroids[cj * d + j] = source[j] * down;
            } else {
                centroids[ci * d + j] = source[j] * down;
                centroids[cj * d + j] = source[j] * up;
            }
        }
        counts[ci] = counts[cj] / 2;
        counts[cj] -= counts[ci];
        nsplit += 1;
    }
    nsplit
}
