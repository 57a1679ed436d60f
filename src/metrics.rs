//! Prometheus metrics for training and scoring.
//!
//! All metrics live in one process-wide registry and are exported in the
//! text exposition format by [`gather_metrics`].
//!
//! ```no_run
//! use infra_early_warning::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["bridge", "1"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    core::Collector, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};

const NAMESPACE: &str = "infra_early_warning";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Successful predictions
    ///
    /// Labels: asset, label
    pub static ref PREDICTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("predictions_total", "Total number of scored queries")
            .namespace(NAMESPACE),
        &["asset", "label"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Rejected or failed predictions
    ///
    /// Labels: asset, code
    pub static ref PREDICTION_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed predictions")
            .namespace(NAMESPACE),
        &["asset", "code"]
    ).expect("Failed to create PREDICTION_ERRORS_TOTAL metric");

    /// Wall time of a full encode and fit
    ///
    /// Labels: asset, outcome
    pub static ref TRAINING_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("training_duration_seconds", "Model training duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["asset", "outcome"]
    ).expect("Failed to create TRAINING_DURATION_SECONDS metric");

    /// Rows in the dataset behind the currently served model
    ///
    /// Labels: asset
    pub static ref TRAINING_ROWS: GaugeVec = GaugeVec::new(
        Opts::new("training_rows", "Rows used to fit the served model")
            .namespace(NAMESPACE),
        &["asset"]
    ).expect("Failed to create TRAINING_ROWS metric");

    /// Number of models installed since startup
    ///
    /// Labels: asset
    pub static ref MODEL_GENERATION: IntCounterVec = IntCounterVec::new(
        Opts::new("model_generation_total", "Number of models installed for an asset")
            .namespace(NAMESPACE),
        &["asset"]
    ).expect("Failed to create MODEL_GENERATION metric");
}

/// Register every metric with [`PROMETHEUS_REGISTRY`]. Safe to call more
/// than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(PREDICTIONS_TOTAL.clone()),
        Box::new(PREDICTION_ERRORS_TOTAL.clone()),
        Box::new(TRAINING_DURATION_SECONDS.clone()),
        Box::new(TRAINING_ROWS.clone()),
        Box::new(MODEL_GENERATION.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Gather all metrics in Prometheus text format
///
/// This function backs the /metrics endpoint
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
