//! Prometheus metrics, enabled by config.

use prometheus::{
    histogram_opts, opts, Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder,
};

pub struct Metrics {
    pub enabled: bool,
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
}

impl Metrics {
    pub fn new(enabled: bool) -> Self {
        let registry = Registry::new();
        let http_requests_total = IntCounterVec::new(
            opts!(
                "ifox_orchestrator_http_requests_total",
                "Total HTTP requests"
            ),
            &["method", "path", "status_code"],
        )
        .expect("static metric definition");
        let http_request_duration_seconds = HistogramVec::new(
            histogram_opts!(
                "ifox_orchestrator_http_request_duration_seconds",
                "HTTP request duration in seconds"
            ),
            &["method", "path"],
        )
        .expect("static metric definition");

        if enabled {
            registry
                .register(Box::new(http_requests_total.clone()))
                .expect("register counter");
            registry
                .register(Box::new(http_request_duration_seconds.clone()))
                .expect("register histogram");
        }

        Self {
            enabled,
            registry,
            http_requests_total,
            http_request_duration_seconds,
        }
    }

    pub fn observe_request(&self, method: &str, path: &str, status: u16, seconds: f64) {
        if !self.enabled {
            return;
        }
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(seconds);
    }

    /// Text exposition of all registered metrics.
    pub fn gather(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "metrics encode failed");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}
