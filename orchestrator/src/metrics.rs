use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge,
};

pub static QUERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!("support_queries_total", "Queries handled, by route", &["route"])
        .expect("register support_queries_total")
});

pub static PROVIDER_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "support_provider_failures_total",
        "Failed calls to external capabilities, by boundary",
        &["boundary"]
    )
    .expect("register support_provider_failures_total")
});

pub static INDEX_DOCUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("support_index_documents", "Chunks currently in the vector index")
        .expect("register support_index_documents")
});

pub static QUERY_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "support_query_duration_seconds",
        "End-to-end query latency",
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("register support_query_duration_seconds")
});

pub fn record_route(route: &str) {
    QUERIES_TOTAL.with_label_values(&[route]).inc();
}

pub fn provider_failure(boundary: &str) {
    PROVIDER_FAILURES_TOTAL.with_label_values(&[boundary]).inc();
}

pub fn set_index_documents(count: usize) {
    INDEX_DOCUMENTS.set(count as i64);
}
