//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration loaded from the environment.
pub mod config;

/// Deribit JSON-RPC venue adapter.
pub mod deribit;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;

/// WebSocket relay server, client and wire codec.
pub mod websocket;
