use std::time::Instant;

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
};

use crate::error::Result;

lazy_static::lazy_static! {
    pub static ref OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiver_operations_total", "Engine operations", &["op", "status"]
    ).unwrap();
    pub static ref OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        "quiver_operation_duration_seconds", "Engine operation duration", &["op"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).unwrap();
    pub static ref VECTORS_ADDED_TOTAL: IntCounter = register_int_counter!(
        "quiver_vectors_added_total", "Vectors added to indexes"
    ).unwrap();
    pub static ref LIVE_HANDLES: IntGaugeVec = register_int_gauge_vec!(
        "quiver_live_handles", "Registered handles", &["kind"]
    ).unwrap();
}

pub fn init() {
    lazy_static::initialize(&OPERATIONS_TOTAL);
    lazy_static::initialize(&OPERATION_DURATION);
    lazy_static::initialize(&VECTORS_ADDED_TOTAL);
    lazy_static::initialize(&LIVE_HANDLES);
}

/// Time `f` and count it under `op` with an `ok`/error-kind status.
pub fn observe<T>(op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let started = Instant::now();
    let result = f();
    OPERATION_DURATION
        .with_label_values(&[op])
        .observe(started.elapsed().as_secs_f64());
    let status = match &result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    OPERATIONS_TOTAL.with_label_values(&[op, status]).inc();
    result
}
