// Prometheus metrics for the coderun API

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Once;

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Finished executions (counter with language, mode and success labels)
    pub static ref EXECUTIONS: CounterVec = CounterVec::new(
        Opts::new("coderun_executions_total", "Total number of finished executions"),
        &["language", "mode", "success"]
    )
    .expect("metric can be created");

    // Execution time histogram (in milliseconds)
    pub static ref EXECUTION_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "coderun_execution_time_ms",
            "Execution time in milliseconds"
        )
        .buckets(vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 15000.0, 45000.0]),
        &["mode"]
    )
    .expect("metric can be created");

    // Requests rejected before execution
    pub static ref REQUESTS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("coderun_requests_rejected_total", "Total requests rejected before execution"),
        &["reason"]
    )
    .expect("metric can be created");
}

static INIT: Once = Once::new();

/// Register collectors with the global registry; safe to call more than once
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 3] = [
            Box::new(EXECUTIONS.clone()),
            Box::new(EXECUTION_TIME.clone()),
            Box::new(REQUESTS_REJECTED.clone()),
        ];

        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::error!(error = %e, "Failed to register collector");
            }
        }
    });
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a finished execution
pub fn record_execution(language: &str, mode: &str, success: bool, execution_time_ms: f64) {
    EXECUTIONS
        .with_label_values(&[language, mode, if success { "true" } else { "false" }])
        .inc();
    EXECUTION_TIME.with_label_values(&[mode]).observe(execution_time_ms);
}

/// Record a request rejected before execution
pub fn record_rejected(reason: &str) {
    REQUESTS_REJECTED.with_label_values(&[reason]).inc();
}
