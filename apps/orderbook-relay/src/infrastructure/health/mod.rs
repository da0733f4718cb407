//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, relay status reporting, and Prometheus metrics.
//! Used by container orchestrators, load balancers, and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (checks upstream fetches)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{UpstreamState, UpstreamStatus};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::websocket::{RelayServer, RelayStats};

/// Consecutive failed fetches after which the relay reports unhealthy.
pub const UNHEALTHY_FAILURE_STREAK: u64 = 5;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Connections, subscriptions and pumps.
    pub relay: RelayStats,
    /// Upstream fetch outcomes.
    pub upstream: UpstreamStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Last upstream fetch succeeded.
    Healthy,
    /// Recent upstream fetches are failing.
    Degraded,
    /// Upstream has failed [`UNHEALTHY_FAILURE_STREAK`] times in a row.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    relay: Arc<RelayServer>,
    upstream: Arc<UpstreamState>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, relay: Arc<RelayServer>, upstream: Arc<UpstreamState>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            relay,
            upstream,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let status = determine_health_status(&state.upstream.status());

    if status == HealthStatus::Unhealthy {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let upstream = state.upstream.status();

    HealthResponse {
        status: determine_health_status(&upstream),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        relay: state.relay.stats(),
        upstream,
    }
}

const fn determine_health_status(upstream: &UpstreamStatus) -> HealthStatus {
    match upstream.consecutive_failures {
        0 => HealthStatus::Healthy,
        n if n < UNHEALTHY_FAILURE_STREAK => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{MarketDataError, MarketDataSource};
    use crate::application::services::{PumpConfig, PumpSet};
    use crate::domain::orderbook::Snapshot;
    use crate::domain::subscription::SubscriptionRegistry;
    use crate::infrastructure::websocket::RelayServerConfig;

    struct NeverSource;

    #[async_trait]
    impl MarketDataSource for NeverSource {
        async fn fetch_snapshot(&self, _symbol: &str) -> Result<Snapshot, MarketDataError> {
            Err(MarketDataError::Unavailable("unused".to_string()))
        }
    }

    fn state() -> (Arc<HealthServerState>, Arc<UpstreamState>) {
        let upstream = Arc::new(UpstreamState::new());
        let pumps = PumpSet::new(
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(NeverSource),
            Arc::clone(&upstream),
            PumpConfig::default(),
        );
        let relay = Arc::new(RelayServer::new(RelayServerConfig::default(), pumps));
        let state = Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            relay,
            Arc::clone(&upstream),
        ));
        (state, upstream)
    }

    fn upstream_with(consecutive_failures: u64) -> UpstreamStatus {
        UpstreamStatus {
            fetch_successes: 0,
            fetch_failures: consecutive_failures,
            fetch_rejections: 0,
            consecutive_failures,
            last_success_at: None,
            last_error: None,
        }
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_failure_streak() {
        assert_eq!(determine_health_status(&upstream_with(0)), HealthStatus::Healthy);
        assert_eq!(determine_health_status(&upstream_with(1)), HealthStatus::Degraded);
        assert_eq!(
            determine_health_status(&upstream_with(UNHEALTHY_FAILURE_STREAK - 1)),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&upstream_with(UNHEALTHY_FAILURE_STREAK)),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn health_reports_relay_counters() {
        let (state, _upstream) = state();

        let (status, body) = get(state, "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["version"], "0.1.0");
        assert_eq!(json["relay"]["connections"], 0);
        assert_eq!(json["relay"]["active_pumps"], 0);
        assert_eq!(json["upstream"]["consecutive_failures"], 0);
    }

    #[tokio::test]
    async fn readiness_fails_after_failure_streak() {
        let (state, upstream) = state();
        let error = MarketDataError::Unavailable("timeout".to_string());

        let (status, _) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);

        for _ in 0..UNHEALTHY_FAILURE_STREAK {
            upstream.record_failure(&error);
        }

        let (status, body) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "NOT READY");

        let (status, _) = get(Arc::clone(&state), "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        upstream.record_success();
        let (status, _) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn rejected_symbols_leave_relay_ready() {
        let (state, upstream) = state();
        let error = MarketDataError::Rejected("10001: instrument_not_found".to_string());

        for _ in 0..UNHEALTHY_FAILURE_STREAK * 4 {
            upstream.record_failure(&error);
        }

        let (status, body) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!((status, body.as_str()), (StatusCode::OK, "READY"));

        let (status, body) = get(state, "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["upstream"]["fetch_rejections"], UNHEALTHY_FAILURE_STREAK * 4);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (state, _upstream) = state();

        assert_eq!(get(state, "/healthz").await, (StatusCode::OK, "OK".to_string()));
    }
}
