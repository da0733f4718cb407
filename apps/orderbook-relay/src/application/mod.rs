//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the update pump and the port interfaces that
//! connect it to the market data venue and to client connections.

/// Port interfaces for external systems (market data, client push).
pub mod ports;

/// Application services for pumping snapshots and tracking upstream health.
pub mod services;
