use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the codebase. The
/// `PrometheusHandle` is retained solely for rendering the scrape endpoints.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric
    /// descriptions. Must be called **once** at startup before any
    /// `counter!` / `gauge!` / `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- Describe all metrics (adds HELP / TYPE lines) ---

        // request path
        describe_counter!(
            "gateway_http_requests_total",
            Unit::Count,
            "Total HTTP requests processed"
        );
        describe_histogram!(
            "gateway_http_request_duration_seconds",
            Unit::Seconds,
            "Total request duration from client perspective"
        );
        describe_gauge!(
            "gateway_http_requests_in_flight",
            Unit::Count,
            "Number of requests currently inside the bridge"
        );

        // correlation registry
        describe_gauge!(
            "gateway_requests_pending",
            Unit::Count,
            "Pending slots awaiting a broker reply"
        );
        describe_counter!(
            "gateway_registry_full_total",
            Unit::Count,
            "Registrations rejected by the in-flight ceiling"
        );

        // broker round-trip
        describe_counter!(
            "gateway_publish_failures_total",
            Unit::Count,
            "Requests the broker refused to accept"
        );
        describe_counter!(
            "gateway_upstream_timeouts_total",
            Unit::Count,
            "Requests that hit the reply deadline"
        );

        // reply listener
        describe_counter!(
            "gateway_orphan_replies_total",
            Unit::Count,
            "Replies with no pending slot, dropped"
        );
        describe_counter!(
            "gateway_late_replies_total",
            Unit::Count,
            "Replies that lost the race against timeout or cancel"
        );
        describe_counter!(
            "gateway_malformed_replies_total",
            Unit::Count,
            "Reply payloads that failed to decode"
        );

        // connections
        describe_gauge!(
            "gateway_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );
        describe_counter!(
            "gateway_connections_total",
            Unit::Count,
            "Total connections accepted"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
