use std::fmt::Debug;

use quiver::{QuiverError, Result};

/// Fraction of `ground_truth[..k]` present in `labels[..k]`.
pub fn recall_at_k(labels: &[i64], ground_truth: &[i64], k: usize) -> f64 {
    let truth = &ground_truth[..k.min(ground_truth.len())];
    if truth.is_empty() {
        return 1.0;
    }
    let found = labels
        .iter()
        .take(k)
        .filter(|l| truth.contains(l))
        .count();
    found as f64 / truth.len() as f64
}

pub fn assert_recall_at_k(labels: &[i64], ground_truth: &[i64], k: usize, min_recall: f64) {
    let recall = recall_at_k(labels, ground_truth, k);
    assert!(
        recall >= min_recall,
        "recall@{k} = {recall:.3}, expected >= {min_recall:.3}. \
         Results: {:?}, Truth: {:?}",
        &labels[..k.min(labels.len())],
        &ground_truth[..k.min(ground_truth.len())]
    );
}

/// Assert element-wise closeness of two float slices.
pub fn assert_vectors_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() <= tolerance,
            "element {i}: {a} vs {e} (tolerance {tolerance})"
        );
    }
}

/// Distances must be best-first for the metric.
pub fn assert_sorted(distances: &[f32], similarity: bool) {
    for pair in distances.windows(2) {
        if similarity {
            assert!(pair[0] >= pair[1], "not descending: {distances:?}");
        } else {
            assert!(pair[0] <= pair[1], "not ascending: {distances:?}");
        }
    }
}

pub fn assert_dimension_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::Dimension { .. }) => {}
        other => panic!("expected Dimension error, got: {other:?}"),
    }
}

pub fn assert_construction_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::Construction { .. }) => {}
        other => panic!("expected Construction error, got: {other:?}"),
    }
}

pub fn assert_not_trained_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::NotTrained { .. }) => {}
        other => panic!("expected NotTrained error, got: {other:?}"),
    }
}

pub fn assert_not_found_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::NotFound { .. }) => {}
        other => panic!("expected NotFound error, got: {other:?}"),
    }
}

pub fn assert_unsupported_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::Unsupported { .. }) => {}
        other => panic!("expected Unsupported error, got: {other:?}"),
    }
}

pub fn assert_unavailable_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::Unavailable { .. }) => {}
        other => panic!("expected Unavailable error, got: {other:?}"),
    }
}

pub fn assert_corrupt_data_error<T: Debug>(result: &Result<T>) {
    match result {
        Err(QuiverError::CorruptData(_)) => {}
        other => panic!("expected CorruptData error, got: {other:?}"),
    }
}
