//! Orderbook Relay Binary
//!
//! Starts the WebSocket snapshot relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DERIBIT_CLIENT_ID`: Deribit API client id
//! - `DERIBIT_CLIENT_SECRET`: Deribit API client secret
//!
//! ## Optional
//! - `DERIBIT_ENV`: test | live (default: test)
//! - `DERIBIT_TIMEOUT_SECS`: HTTP request timeout (default: 10)
//! - `RELAY_PORT`: WebSocket port (default: 9002)
//! - `RELAY_HEALTH_PORT`: Health check and metrics HTTP port (default: 8082)
//! - `RELAY_POLL_INTERVAL_MS`: Snapshot poll interval (default: 1000)
//! - `RELAY_OUTBOUND_CAPACITY`: Per-connection outbound queue (default: 256)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: orderbook-relay)
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orderbook_relay::application::services::{PumpConfig, PumpSet, UpstreamState};
use orderbook_relay::domain::subscription::SubscriptionRegistry;
use orderbook_relay::infrastructure::deribit::{DeribitClient, DeribitConfig};
use orderbook_relay::infrastructure::health::{HealthServer, HealthServerState};
use orderbook_relay::infrastructure::telemetry;
use orderbook_relay::infrastructure::websocket::{RelayServer, RelayServerConfig};
use orderbook_relay::{RelayConfig, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Orderbook Relay");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = RelayConfig::from_env()?;
    log_config(&config);

    // Authenticate with the venue before accepting any client
    let deribit = Arc::new(DeribitClient::new(&DeribitConfig::for_environment(
        config.environment,
        &config.upstream,
    ))?);
    deribit.authenticate(&config.credentials).await?;

    let shutdown_token = CancellationToken::new();

    // Initialize registry and pumps
    let registry = Arc::new(SubscriptionRegistry::new());
    let upstream = Arc::new(UpstreamState::new());
    let pumps = PumpSet::new(
        Arc::clone(&registry),
        deribit,
        Arc::clone(&upstream),
        PumpConfig {
            poll_interval: config.relay.poll_interval,
        },
    );

    // Initialize relay server
    let relay_server = Arc::new(RelayServer::new(
        RelayServerConfig {
            outbound_capacity: config.relay.outbound_capacity,
        },
        pumps.clone(),
    ));

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&relay_server),
        Arc::clone(&upstream),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn health server
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Bind before reporting ready so a taken port is fatal
    let relay_addr = SocketAddr::from(([0, 0, 0, 0], config.server.relay_port));
    let listener = RelayServer::bind(relay_addr).await?;

    let relay_shutdown = shutdown_token.clone();
    let relay_task = tokio::spawn(Arc::clone(&relay_server).serve(listener, relay_shutdown));

    tracing::info!("Orderbook relay ready");

    await_shutdown(shutdown_token).await;

    // Connections drop their subscriptions on the way out, then pumps drain
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        match relay_task.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Relay server error"),
            Err(e) => tracing::error!(error = %e, "Relay server task failed"),
            Ok(Ok(())) => {}
        }
        pumps.wait_idle().await;
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            active_pumps = pumps.active(),
            "Shutdown timed out with pumps still running"
        );
    }

    tracing::info!("Orderbook relay stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        relay_port = config.server.relay_port,
        health_port = config.server.health_port,
        poll_interval_ms = u64::try_from(config.relay.poll_interval.as_millis()).unwrap_or(u64::MAX),
        outbound_capacity = config.relay.outbound_capacity,
        "Configuration loaded"
    );
    if config.environment.is_live() {
        tracing::warn!("Polling the live Deribit venue with production credentials");
    }
    tracing::debug!(
        api_base_url = config.environment.api_base_url(),
        timeout_secs = config.upstream.request_timeout.as_secs(),
        "Deribit endpoint"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
