// metrics/prometheus.rs - Prometheus Exporter

use std::net::SocketAddr;

use ::metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::error::TelemetryError;

use super::{LlmMetrics, PlanningMetrics, RunMetrics, ToolMetrics};

/// Configuration for the Prometheus endpoint.
#[derive(Clone, Debug)]
pub struct ExporterConfig {
    /// Address to expose the scrape endpoint
    pub listen_addr: SocketAddr,

    /// Histogram buckets for duration metrics (in seconds)
    pub duration_buckets: Vec<f64>,

    /// Histogram buckets for tool loop iteration counts
    pub iteration_buckets: Vec<f64>,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9464".parse().unwrap(),
            duration_buckets: vec![
                0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
            ],
            iteration_buckets: vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0],
        }
    }
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct ExporterHandle {
    handle: PrometheusHandle,
}

impl ExporterHandle {
    /// Render current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Install the Prometheus recorder and start an HTTP server exposing
/// `/metrics` and `/health` on the configured address.
///
/// Must be called at most once per process; a second install fails because
/// the global recorder slot is already taken.
pub fn install_exporter(config: ExporterConfig) -> Result<ExporterHandle, TelemetryError> {
    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("_duration_seconds".into()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidMetricsConfig(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(ToolMetrics::LOOP_ITERATIONS.into()),
            &config.iteration_buckets,
        )
        .map_err(|e| TelemetryError::InvalidMetricsConfig(e.to_string()))?;

    let handle = builder
        .install_recorder()
        .map_err(|e| TelemetryError::RecorderInstall(e.to_string()))?;
    let exporter_handle = ExporterHandle {
        handle: handle.clone(),
    };

    let listen_addr = config.listen_addr;
    let shared_handle = std::sync::Arc::new(handle);

    tokio::spawn(async move {
        use axum::{Json, Router, http::StatusCode, routing::get};
        use serde::Serialize;

        #[derive(Serialize)]
        struct HealthResponse {
            status: &'static str,
            version: &'static str,
            uptime_secs: u64,
        }

        let start_time = std::time::Instant::now();

        let handle_for_route = shared_handle.clone();
        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let h = handle_for_route.clone();
                    async move { h.render() }
                }),
            )
            .route(
                "/health",
                get(move || {
                    let uptime = start_time.elapsed().as_secs();
                    async move {
                        Json(HealthResponse {
                            status: "healthy",
                            version: env!("CARGO_PKG_VERSION"),
                            uptime_secs: uptime,
                        })
                    }
                }),
            )
            .route("/ready", get(|| async { StatusCode::OK }));

        match tokio::net::TcpListener::bind(listen_addr).await {
            Ok(listener) => {
                tracing::info!(addr = %listen_addr, "metrics HTTP server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, addr = %listen_addr, "failed to bind metrics server");
            }
        }
    });

    describe_gauge!(RunMetrics::ACTIVE, "Currently executing agent runs");
    describe_histogram!(
        RunMetrics::DURATION_SECONDS,
        "End-to-end agent run duration in seconds"
    );
    describe_counter!(RunMetrics::ERRORS_TOTAL, "Total failed agent runs");
    describe_counter!(
        RunMetrics::STUCK_TOTAL,
        "Total agent runs that reported being stuck"
    );

    describe_counter!(LlmMetrics::REQUESTS_TOTAL, "Total model invocations");
    describe_histogram!(
        LlmMetrics::DURATION_SECONDS,
        "Model invocation latency in seconds"
    );
    describe_counter!(
        LlmMetrics::TOKENS_TOTAL,
        "Total tokens consumed and produced"
    );
    describe_counter!(
        LlmMetrics::COST_TOTAL,
        "Total model spend in millionths of the billing currency"
    );

    describe_counter!(ToolMetrics::CALLS_TOTAL, "Total tool invocations");
    describe_histogram!(
        ToolMetrics::DURATION_SECONDS,
        "Tool invocation latency in seconds"
    );
    describe_counter!(ToolMetrics::ERRORS_TOTAL, "Total failed tool invocations");
    describe_histogram!(
        ToolMetrics::LOOP_ITERATIONS,
        "Iterations per tool-use loop"
    );

    describe_counter!(
        PlanningMetrics::REPLANS_TOTAL,
        "Total explicit replan requests"
    );

    tracing::info!(addr = %config.listen_addr, "metrics exporter initialized");

    Ok(exporter_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExporterConfig::default();
        assert_eq!(config.listen_addr.port(), 9464);
        assert!(!config.duration_buckets.is_empty());
        assert!(config.iteration_buckets.iter().all(|b| *b >= 1.0));
    }
}
