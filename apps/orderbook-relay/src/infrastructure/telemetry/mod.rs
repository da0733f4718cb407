//! Tracing Setup
//!
//! Structured logs on stderr for both binaries, plus optional span export
//! over OTLP for the relay server.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "false", "0" or "off" to disable export (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4318)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: orderbook-relay)
//! - `RUST_LOG`: Extra filter directives on top of the built-in ones
//!
//! # Usage
//!
//! ```ignore
//! use orderbook_relay::infrastructure::telemetry;
//!
//! let _guard = telemetry::init();
//! tracing::info!(port = 9002, "Relay listening");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Service name reported with exported spans.
const DEFAULT_SERVICE_NAME: &str = "orderbook-relay";

/// Default OTLP endpoint.
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Directives applied before `RUST_LOG`. Transport crates are noisy at info.
const BASE_DIRECTIVES: [&str; 4] = [
    "orderbook_relay=info",
    "tungstenite=warn",
    "hyper=warn",
    "reqwest=warn",
];

/// Flushes exported spans when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    /// Whether spans are being exported.
    #[must_use]
    pub const fn is_exporting(&self) -> bool {
        self.tracer_provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to flush relay spans: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Whether spans are exported over OTLP.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Logs only. Used by the relay client.
    #[must_use]
    pub fn local() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: export_enabled(std::env::var("OTEL_ENABLED").ok().as_deref()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or(defaults.otlp_endpoint),
            service_name: std::env::var("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }
}

/// Unset or unrecognised values leave export on.
fn export_enabled(value: Option<&str>) -> bool {
    !matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("false" | "0" | "off" | "no")
    )
}

/// Base directives followed by whatever `RUST_LOG` adds.
fn env_filter() -> EnvFilter {
    BASE_DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

fn build_tracer_provider(
    config: &TelemetryConfig,
) -> Result<SdkTracerProvider, opentelemetry_otlp::ExporterBuildError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build())
}

/// Initialize telemetry from the environment.
///
/// Keep the guard alive for the lifetime of the process.
#[must_use]
pub fn init() -> TelemetryGuard {
    init_with_config(TelemetryConfig::from_env())
}

/// Initialize telemetry with an explicit configuration.
///
/// An exporter that cannot be built downgrades to logs only. A second call
/// in the same process leaves the first subscriber in place.
#[must_use]
pub fn init_with_config(config: TelemetryConfig) -> TelemetryGuard {
    // Logs go to stderr so the client's rendered snapshots own stdout
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let (tracer_provider, export_error) = if config.enabled {
        match build_tracer_provider(&config) {
            Ok(provider) => (Some(provider), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(config.service_name.clone()))
    });

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .with(otel_layer)
        .try_init();

    if let Some(e) = export_error {
        tracing::warn!(
            endpoint = %config.otlp_endpoint,
            error = %e,
            "OTLP exporter unavailable, logging locally only"
        );
    }

    TelemetryGuard { tracer_provider }
}

// =============================================================================
// Tests
// =============================================================================
