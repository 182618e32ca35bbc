use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n` random vectors of dimension `dims`, uniform in [-1, 1], as one flat buffer.
pub fn random_vectors(n: usize, dims: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n * dims).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

/// Vectors clustered around `n_clusters` known centroids.
/// Returns (flat buffer, centroids). Vector `i` belongs to cluster `i / n_per_cluster`.
///
/// Each centroid is a random unit vector; members add uniform noise in
/// [-noise, noise] per coordinate.
pub fn clustered_vectors(
    n_clusters: usize,
    n_per_cluster: usize,
    dims: usize,
    noise: f32,
) -> (Vec<f32>, Vec<Vec<f32>>) {
    let mut rng = StdRng::seed_from_u64(123);

    let centroids: Vec<Vec<f32>> = (0..n_clusters)
        .map(|_| {
            let v: Vec<f32> = (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter().map(|x| x / norm).collect()
        })
        .collect();

    let mut vectors = Vec::with_capacity(n_clusters * n_per_cluster * dims);
    for centroid in &centroids {
        for _ in 0..n_per_cluster {
            vectors.extend(centroid.iter().map(|&c| c + rng.gen_range(-noise..noise)));
        }
    }

    (vectors, centroids)
}

/// Row `i` of a flat buffer.
pub fn row(vectors: &[f32], dims: usize, i: usize) -> &[f32] {
    &vectors[i * dims..(i + 1) * dims]
}

/// Native-endian bytes, as a host would pass them across the boundary.
pub fn f32_bytes(values: &[f32]) -> bytes::Bytes {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>().into()
}

pub fn id_bytes(values: &[i64]) -> bytes::Bytes {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect::<Vec<u8>>().into()
}
