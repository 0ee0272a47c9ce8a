use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use axum::{Router, routing::get, extract::State, response::IntoResponse};
use std::sync::Arc;

use crate::server::ServerState;

/// Struct for managing relay health metrics, including open sessions and command counts.
#[derive(Clone)]
pub struct HealthMetrics {
    /// Tracks the number of currently open sessions.
    pub sessions_open: IntGauge,
    /// Counts the request lines received across all sessions.
    pub lines_received: IntCounter,
    /// Counts the commands the executor reported as succeeded.
    pub commands_executed: IntCounter,
    /// Counts the commands that failed or could not be dispatched.
    pub commands_failed: IntCounter,
    /// Prometheus registry used to store and manage the metrics.
    registry: Registry,
}

impl HealthMetrics {
    /// Creates a new instance of `HealthMetrics` and registers the metrics with Prometheus.
    pub fn new() -> Self {
        let registry = Registry::new();
        let sessions_open = IntGauge::new("sessions_open", "Open relay sessions").unwrap();
        let lines_received =
            IntCounter::new("lines_received", "Total request lines received").unwrap();
        let commands_executed =
            IntCounter::new("commands_executed", "Total commands executed successfully").unwrap();
        let commands_failed =
            IntCounter::new("commands_failed", "Total commands failed or undispatchable").unwrap();

        registry.register(Box::new(sessions_open.clone())).unwrap();
        registry.register(Box::new(lines_received.clone())).unwrap();
        registry
            .register(Box::new(commands_executed.clone()))
            .unwrap();
        registry.register(Box::new(commands_failed.clone())).unwrap();

        Self {
            sessions_open,
            lines_received,
            commands_executed,
            commands_failed,
            registry,
        }
    }

    /// Exposes the current state of all registered metrics in Prometheus-compatible format.
    pub fn expose_metrics(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for HealthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts an HTTP server exposing the metrics on `port`.
///
/// Serves the `/metrics` endpoint with Prometheus-compatible data for
/// as long as the process runs.
pub async fn serve_metrics_http(state: Arc<ServerState>, port: u16) {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    axum::Server::bind(&format!("0.0.0.0:{}", port).parse().unwrap())
        .serve(app.into_make_service())
        .await
        .unwrap();
}

/// Handles the `/metrics` HTTP request and returns the current metrics data.
async fn metrics_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    state.metrics.expose_metrics()
}
