use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Gauge, Opts, Registry, TextEncoder};

/// Metric name prefix for all engine metrics
const PREFIX: &str = "notification_engine";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref PUSHES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_pushes_total"),
        "Total number of batches pushed by the event source"
    ).expect("Failed to create pushes_total metric");

    pub static ref LISTENER_RETRIES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_listener_retries_total"),
        "Total number of scheduled subscription reconnections"
    ).expect("Failed to create listener_retries_total metric");

    pub static ref LISTENER_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_listener_failures_total"), "Terminal subscription failures"),
        &["kind"]
    ).expect("Failed to create listener_failures_total metric");

    pub static ref BATCH_CHUNKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_batch_chunks_total"), "Bulk mutation chunks issued"),
        &["operation", "status"]
    ).expect("Failed to create batch_chunks_total metric");

    pub static ref UNREAD_NOTIFICATIONS: Gauge = Gauge::new(
        format!("{PREFIX}_unread_notifications"),
        "Unread count of the last published snapshot"
    ).expect("Failed to create unread_notifications metric");
}

/// Register all metrics. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(PUSHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LISTENER_RETRIES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(LISTENER_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BATCH_CHUNKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(UNREAD_NOTIFICATIONS.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_push() {
    PUSHES_TOTAL.inc();
}

pub fn record_retry_scheduled() {
    LISTENER_RETRIES_TOTAL.inc();
}

pub fn record_listener_failure(kind: &str) {
    LISTENER_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_batch_chunk(operation: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    BATCH_CHUNKS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn set_unread_notifications(count: usize) {
    UNREAD_NOTIFICATIONS.set(count as f64);
}

/// Render the registry in the Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
