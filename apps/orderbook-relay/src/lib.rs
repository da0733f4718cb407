#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Orderbook Relay - Snapshot Fan-out over WebSocket
//!
//! Polls Deribit for orderbook snapshots and pushes them to every relay
//! client subscribed to the instrument. One update pump runs per
//! (connection, symbol) pair and stops by itself once the pair leaves the
//! subscription registry.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core relay types
//!   - `orderbook`: Snapshots and price levels
//!   - `subscription`: Registry of (connection, symbol) pairs
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Market data source and snapshot sink interfaces
//!   - `services`: Update pumps and upstream health tracking
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `websocket`: Relay server, relay client and wire codec
//!   - `deribit`: JSON-RPC venue client
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!  client ──subscribe──► RelayServer ──► SubscriptionRegistry
//!                             │
//!                             └─ new pair ─► UpdatePump ──fetch──► Deribit
//!                                                │
//!  client ◄────────── snapshot ──────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::orderbook::{PriceLevel, Snapshot};
pub use domain::subscription::{
    ConnectionId, RegistryStats, Subscription, SubscriptionRegistry, Symbol,
};

// Ports and services
pub use application::ports::{MarketDataError, MarketDataSource, PushError, SnapshotSink};
pub use application::services::{PumpConfig, PumpSet, UpstreamState, UpstreamStatus};

// Infrastructure config
pub use infrastructure::config::{
    ClientSettings, ConfigError, Credentials, Environment, RelayConfig, RelaySettings,
    ServerSettings, UpstreamSettings,
};

// Relay transport
pub use infrastructure::websocket::{
    ClientError, ClientEvent, ControlMessage, RelayClient, RelayServer, RelayServerConfig,
    RelayServerError, RelayStats, render_snapshot,
};

// Venue adapter
pub use infrastructure::deribit::{DeribitClient, DeribitConfig, DeribitError};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
