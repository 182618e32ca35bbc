mod common;

use assert_approx_eq::assert_approx_eq;

use common::assertions::{
    assert_construction_error, assert_dimension_error, assert_not_found_error,
    assert_not_trained_error, assert_recall_at_k, assert_sorted, assert_unsupported_error,
    assert_vectors_close,
};
use common::vectors::{clustered_vectors, random_vectors, row};

use quiver::{Index, Metric, EMPTY_LABEL};

// ─── Construction ───

#[test]
fn test_create_is_empty_with_expected_training_state() {
    let cases = [
        ("Flat", true),
        ("IDMap,Flat", true),
        ("SQfp16", true),
        ("SQ8", false),
        ("PQ2", false),
        ("IVF4,Flat", false),
        ("IVF4,PQ2x4", false),
        ("IDMap,IVF4,SQ8", false),
    ];
    for (description, trained) in cases {
        let index = Index::new(8, description, Metric::L2).unwrap();
        assert_eq!(index.n_total(), 0, "{description}");
        assert_eq!(index.dim(), 8, "{description}");
        assert_eq!(index.is_trained(), trained, "{description}");
        assert_eq!(index.description(), description);
    }
}

#[test]
fn test_create_rejects_bad_descriptions() {
    assert_construction_error(&Index::new(8, "HNSW32", Metric::L2));
    assert_construction_error(&Index::new(8, "PQ3", Metric::L2));
    assert_construction_error(&Index::new(8, "IVF0,Flat", Metric::L2));
    assert_construction_error(&Index::new(8, "Flat,IVF4", Metric::L2));
    assert_construction_error(&Index::new(0, "Flat", Metric::L2));
    assert_construction_error(&Index::new(8, "IVF4,Flat", Metric::L1));
    assert_construction_error(&Index::new(8, "SQ8", Metric::Linf));
}

// ─── Flat search ───

#[test]
fn test_flat_exact_match_returns_label_zero() {
    let mut index = Index::new(4, "Flat", Metric::L2).unwrap();
    let vectors = [
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0,
    ];
    index.add(3, &vectors).unwrap();
    assert_eq!(index.n_total(), 3);

    let out = index.search(1, &[1.0, 0.0, 0.0, 0.0], 1).unwrap();
    assert_eq!(out.labels, vec![0]);
    assert_eq!(out.distances, vec![0.0]);
}

#[test]
fn test_search_pads_with_sentinels() {
    let mut index = Index::new(2, "Flat", Metric::L2).unwrap();
    index.add(2, &[0.0, 0.0, 1.0, 1.0]).unwrap();

    let out = index.search(1, &[0.0, 0.0], 4).unwrap();
    assert_eq!(out.labels, vec![0, 1, EMPTY_LABEL, EMPTY_LABEL]);
    assert_eq!(out.distances[2], f32::MAX);
    assert_eq!(out.distances[3], f32::MAX);

    let mut ip = Index::new(2, "Flat", Metric::InnerProduct).unwrap();
    ip.add(1, &[1.0, 0.0]).unwrap();
    let out = ip.search(1, &[1.0, 0.0], 2).unwrap();
    assert_eq!(out.labels, vec![0, EMPTY_LABEL]);
    assert_eq!(out.distances[1], -f32::MAX);
}

#[test]
fn test_search_on_empty_index_is_all_sentinels() {
    let index = Index::new(3, "Flat", Metric::L2).unwrap();
    let out = index.search(2, &[0.0; 6], 2).unwrap();
    assert_eq!(out.labels, vec![EMPTY_LABEL; 4]);
}

#[test]
fn test_inner_product_orders_descending() {
    let mut index = Index::new(2, "Flat", Metric::InnerProduct).unwrap();
    index.add(3, &[1.0, 0.0, 2.0, 0.0, 0.0, 1.0]).unwrap();

    let out = index.search(1, &[1.0, 0.0], 3).unwrap();
    assert_eq!(out.labels, vec![1, 0, 2]);
    assert_eq!(out.distances, vec![2.0, 1.0, 0.0]);
    assert_sorted(&out.distances, true);
}

#[test]
fn test_ties_prefer_smaller_id() {
    let mut index = Index::new(2, "Flat", Metric::L2).unwrap();
    index.add(3, &[5.0, 5.0, 1.0, 1.0, 1.0, 1.0]).unwrap();
    let out = index.search(1, &[1.0, 1.0], 2).unwrap();
    assert_eq!(out.labels, vec![1, 2]);
}

#[test]
fn test_l1_and_linf_metrics() {
    let data = [0.0, 0.0, 3.0, 4.0];

    let mut l1 = Index::new(2, "Flat", Metric::L1).unwrap();
    l1.add(2, &data).unwrap();
    let out = l1.search(1, &[1.0, 1.0], 2).unwrap();
    assert_eq!(out.labels, vec![0, 1]);
    assert_eq!(out.distances, vec![2.0, 5.0]);

    let mut linf = Index::new(2, "IDMap,Flat", Metric::Linf).unwrap();
    linf.add(2, &data).unwrap();
    let out = linf.search(1, &[1.0, 1.0], 2).unwrap();
    assert_eq!(out.distances, vec![1.0, 3.0]);
}

#[test]
fn test_batched_search_rows_are_independent() {
    let dims = 8;
    let data = random_vectors(50, dims);
    let mut index = Index::new(dims, "Flat", Metric::L2).unwrap();
    index.add(50, &data).unwrap();

    let queries: Vec<f32> = [3usize, 17, 42]
        .iter()
        .flat_map(|&i| row(&data, dims, i).to_vec())
        .collect();
    let out = index.search(3, &queries, 5).unwrap();
    assert_eq!(out.labels.len(), 15);
    assert_eq!(out.labels[0], 3);
    assert_eq!(out.labels[5], 17);
    assert_eq!(out.labels[10], 42);
    for chunk in out.distances.chunks(5) {
        assert_sorted(chunk, false);
    }
}

// ─── Ids and reconstruction ───

#[test]
fn test_add_with_ids_and_reconstruct() {
    let mut index = Index::new(3, "IDMap,Flat", Metric::L2).unwrap();
    let vectors = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    index.add_with_ids(2, &vectors, &[100, 200]).unwrap();
    assert_eq!(index.n_total(), 2);

    let first = index.reconstruct_batch(1, &[100]).unwrap();
    assert_eq!(first, vec![1.0, 2.0, 3.0]);

    assert_not_found_error(&index.reconstruct_batch(1, &[999]));

    let out = index.search(1, &[4.0, 5.0, 6.0], 1).unwrap();
    assert_eq!(out.labels, vec![200]);
}

#[test]
fn test_id_map_plain_add_is_sequential_from_n_total() {
    let mut index = Index::new(1, "IDMap,Flat", Metric::L2).unwrap();
    index.add(2, &[0.0, 1.0]).unwrap();
    index.add_with_ids(1, &[2.0], &[50]).unwrap();
    index.add(1, &[3.0]).unwrap();

    assert_eq!(index.reconstruct(3).unwrap(), vec![3.0]);
    assert_eq!(index.reconstruct(50).unwrap(), vec![2.0]);
    assert_not_found_error(&index.reconstruct(2));
}

#[test]
fn test_add_with_ids_unsupported_on_plain_structures() {
    for description in ["Flat", "SQfp16"] {
        let mut index = Index::new(2, description, Metric::L2).unwrap();
        assert_unsupported_error(&index.add_with_ids(1, &[1.0, 2.0], &[7]));
        assert_eq!(index.n_total(), 0);
    }
}

#[test]
fn test_scalar_quantizer_reconstruction_is_close() {
    let dims = 8;
    let data = random_vectors(100, dims);

    let mut sq8 = Index::new(dims, "SQ8", Metric::L2).unwrap();
    sq8.train(100, &data).unwrap();
    assert!(sq8.is_trained());
    sq8.add(100, &data).unwrap();
    assert_vectors_close(&sq8.reconstruct(5).unwrap(), row(&data, dims, 5), 0.01);

    let mut fp16 = Index::new(dims, "SQfp16", Metric::L2).unwrap();
    fp16.add(100, &data).unwrap();
    let decoded = fp16.reconstruct(7).unwrap();
    for (a, b) in decoded.iter().zip(row(&data, dims, 7)) {
        assert_approx_eq!(a, b, 1e-3);
    }
}

#[test]
fn test_compute_residuals() {
    let mut index = Index::new(2, "Flat", Metric::L2).unwrap();
    index.add(2, &[1.0, 1.0, 4.0, 2.0]).unwrap();

    let residuals = index
        .compute_residuals(2, &[2.0, 3.0, 4.0, 4.0], &[0, 1])
        .unwrap();
    assert_eq!(residuals, vec![1.0, 2.0, 0.0, 2.0]);

    assert_not_found_error(&index.compute_residuals(1, &[0.0, 0.0], &[9]));
    assert_dimension_error(&index.compute_residuals(2, &[0.0, 0.0], &[0, 1]));
}

// ─── Training lifecycle ───

#[test]
fn test_operations_before_training_fail_explicitly() {
    let mut pq = Index::new(4, "PQ2x2", Metric::L2).unwrap();
    assert_not_trained_error(&pq.add(1, &[0.0; 4]));
    assert_not_trained_error(&pq.search(1, &[0.0; 4], 1));

    let mut ivf = Index::new(4, "IVF2,Flat", Metric::L2).unwrap();
    assert_not_trained_error(&ivf.add_with_ids(1, &[0.0; 4], &[1]));
    assert_eq!(ivf.n_total(), 0);
}

#[test]
fn test_shape_errors() {
    let mut index = Index::new(4, "IVF2,Flat", Metric::L2).unwrap();
    assert_dimension_error(&index.train(0, &[]));
    assert_dimension_error(&index.train(2, &[0.0; 7]));

    let flat = Index::new(4, "Flat", Metric::L2).unwrap();
    assert_dimension_error(&flat.search(1, &[0.0; 4], 0));
    assert_dimension_error(&flat.search(2, &[0.0; 4], 1));
}

#[test]
fn test_zero_count_add_and_search_are_noops() {
    let mut index = Index::new(4, "Flat", Metric::L2).unwrap();
    index.add(0, &[]).unwrap();
    assert_eq!(index.n_total(), 0);
    let out = index.search(0, &[], 3).unwrap();
    assert!(out.labels.is_empty());
}

#[test]
fn test_reset_clears_vectors_but_keeps_training() {
    let dims = 8;
    let (data, _) = clustered_vectors(4, 50, dims, 0.05);

    let mut index = Index::new(dims, "IVF4,Flat", Metric::L2).unwrap();
    index.train(200, &data).unwrap();
    index.add(200, &data).unwrap();
    index.reset().unwrap();
    assert_eq!(index.n_total(), 0);
    assert!(index.is_trained());

    index.add(10, &data[..10 * dims]).unwrap();
    assert_eq!(index.n_total(), 10);
    // Ids restart from zero like a fresh index.
    assert_eq!(index.reconstruct(0).unwrap(), row(&data, dims, 0));
}

#[test]
fn test_reset_then_add_matches_fresh_index() {
    let dims = 4;
    let data = random_vectors(20, dims);

    let mut reused = Index::new(dims, "Flat", Metric::L2).unwrap();
    reused.add(20, &data).unwrap();
    reused.reset().unwrap();
    reused.add(10, &data[..10 * dims]).unwrap();

    let mut fresh = Index::new(dims, "Flat", Metric::L2).unwrap();
    fresh.add(10, &data[..10 * dims]).unwrap();

    let queries = &data[10 * dims..];
    assert_eq!(
        reused.search(10, queries, 3).unwrap(),
        fresh.search(10, queries, 3).unwrap()
    );
}

fn two_blobs() -> Vec<f32> {
    (0..20)
        .flat_map(|i| {
            let e = i as f32 * 0.01;
            [e, 0.0, 10.0 + e, 10.0]
        })
        .collect()
}

#[test]
fn test_retraining_populated_encoded_index_is_refused() {
    let data = two_blobs();
    let mut ivf = Index::new(2, "IVF2,SQfp16", Metric::L2).unwrap();
    ivf.train(40, &data).unwrap();
    ivf.add(1, &[10.0, 10.0]).unwrap();

    let shifted: Vec<f32> = data.iter().map(|x| x + 100.0).collect();
    assert_unsupported_error(&ivf.train(40, &shifted));
    assert_eq!(ivf.n_total(), 1);
    assert_eq!(ivf.search(1, &[10.0, 10.0], 1).unwrap().labels, vec![0]);
    assert_vectors_close(&ivf.reconstruct(0).unwrap(), &[10.0, 10.0], 1e-2);

    let mut sq8 = Index::new(1, "SQ8", Metric::L2).unwrap();
    sq8.train(2, &[0.0, 1.0]).unwrap();
    sq8.add(1, &[0.5]).unwrap();
    assert_unsupported_error(&sq8.train(2, &[0.0, 0.1]));
    assert_approx_eq!(sq8.reconstruct(0).unwrap()[0], 0.5, 1.0 / 255.0);

    let mut mapped = Index::new(1, "IDMap,SQ8", Metric::L2).unwrap();
    mapped.train(2, &[0.0, 1.0]).unwrap();
    mapped.add_with_ids(1, &[0.5], &[42]).unwrap();
    assert_unsupported_error(&mapped.train(2, &[0.0, 0.1]));
}

#[test]
fn test_retraining_after_reset_uses_new_parameters() {
    let mut sq8 = Index::new(1, "SQ8", Metric::L2).unwrap();
    sq8.train(2, &[0.0, 1.0]).unwrap();
    sq8.add(1, &[0.5]).unwrap();
    sq8.reset().unwrap();

    sq8.train(2, &[0.0, 0.1]).unwrap();
    sq8.add(1, &[0.05]).unwrap();
    assert_approx_eq!(sq8.reconstruct(0).unwrap()[0], 0.05, 0.1 / 255.0);
}

#[test]
fn test_training_unencoded_index_keeps_vectors() {
    for description in ["Flat", "SQfp16", "IDMap,Flat"] {
        let mut index = Index::new(2, description, Metric::L2).unwrap();
        index.add(1, &[3.0, 4.0]).unwrap();
        index.train(1, &[0.0, 0.0]).unwrap();
        assert_eq!(index.n_total(), 1, "{description}");
        assert_vectors_close(&index.reconstruct(0).unwrap(), &[3.0, 4.0], 1e-3);
    }
}

#[test]
fn test_failed_training_leaves_index_unchanged() {
    let dims = 4;
    let data = random_vectors(64, dims);
    let mut index = Index::new(dims, "IVF2,PQ2x4", Metric::L2).unwrap();
    index.train(64, &data).unwrap();
    let before = index.clone();

    // Enough points for two lists but not for 16 codebook entries.
    assert_dimension_error(&index.train(8, &data[..8 * dims]));
    assert!(index.is_trained());

    let mut expected = before;
    index.add(64, &data).unwrap();
    expected.add(64, &data).unwrap();
    assert_eq!(
        index.search(4, &data[..4 * dims], 5).unwrap(),
        expected.search(4, &data[..4 * dims], 5).unwrap()
    );
    assert_eq!(index.reconstruct(9).unwrap(), expected.reconstruct(9).unwrap());
}

#[test]
fn test_overflowing_counts_are_dimension_errors() {
    let mut index = Index::new(4, "Flat", Metric::L2).unwrap();
    assert_dimension_error(&index.add(usize::MAX / 4 + 1, &[]));
    assert_dimension_error(&index.train(usize::MAX / 2, &[]));
    assert_dimension_error(&index.add_with_ids(usize::MAX / 4 + 1, &[], &[]));

    let huge_k = usize::MAX / 2 + 1;
    assert_dimension_error(&index.search(2, &[0.0; 8], huge_k));
    let (mut distances, mut labels) = (Vec::new(), Vec::new());
    assert_dimension_error(&index.search_into(2, &[0.0; 8], huge_k, &mut distances, &mut labels));
}

// ─── Inverted file ───

#[test]
fn test_ivf_full_probe_matches_flat() {
    let dims = 16;
    let (data, centroids) = clustered_vectors(4, 50, dims, 0.05);

    let mut flat = Index::new(dims, "Flat", Metric::L2).unwrap();
    flat.add(200, &data).unwrap();

    let mut ivf = Index::new(dims, "IVF4,Flat", Metric::L2).unwrap();
    ivf.train(200, &data).unwrap();
    ivf.add(200, &data).unwrap();
    ivf.set_nprobe(4).unwrap();

    let truth = flat.search(1, &centroids[0], 10).unwrap();
    let found = ivf.search(1, &centroids[0], 10).unwrap();
    assert_recall_at_k(&found.labels, &truth.labels, 10, 1.0);
    assert_eq!(found.distances, truth.distances);
}

#[test]
fn test_ivf_pq_finds_the_right_cluster() {
    let dims = 8;
    let per_cluster = 75;
    let (data, _) = clustered_vectors(4, per_cluster, dims, 0.01);
    let n = 4 * per_cluster;

    let mut index = Index::new(dims, "IDMap,IVF2,PQ4", Metric::L2).unwrap();
    index.train(n, &data).unwrap();
    index.add(n, &data).unwrap();
    assert_eq!(index.n_total(), n);

    for i in [0usize, 80, 160, 299] {
        let out = index.search(1, row(&data, dims, i), 1).unwrap();
        assert_eq!(
            out.labels[0] as usize / per_cluster,
            i / per_cluster,
            "query {i} matched {}",
            out.labels[0]
        );
    }

    let decoded = index.reconstruct(10).unwrap();
    assert_vectors_close(&decoded, row(&data, dims, 10), 0.1);
}

#[test]
fn test_ivf_residuals_against_stored_vectors() {
    let dims = 8;
    let (data, _) = clustered_vectors(2, 50, dims, 0.05);
    let mut index = Index::new(dims, "IVF2,Flat", Metric::L2).unwrap();
    index.train(100, &data).unwrap();
    index.add(100, &data).unwrap();

    let residuals = index
        .compute_residuals(1, row(&data, dims, 3), &[3])
        .unwrap();
    assert!(residuals.iter().all(|r| *r == 0.0));
}

// ─── Ownership ───

#[test]
fn test_clone_is_independent() {
    let mut original = Index::new(2, "Flat", Metric::L2).unwrap();
    original.add(1, &[1.0, 1.0]).unwrap();

    let mut copy = original.clone();
    copy.add(1, &[2.0, 2.0]).unwrap();
    copy.reset().unwrap();
    copy.add(1, &[9.0, 9.0]).unwrap();

    assert_eq!(original.n_total(), 1);
    assert_eq!(original.reconstruct(0).unwrap(), vec![1.0, 1.0]);
    assert_eq!(copy.reconstruct(0).unwrap(), vec![9.0, 9.0]);
}
