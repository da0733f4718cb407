//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`MarketDataSource`]: fetches the latest orderbook snapshot for a symbol
//! - [`SnapshotSink`]: pushes a snapshot to one client connection

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::orderbook::Snapshot;

/// Market data fetch failure.
///
/// Always treated as transient by the pump.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketDataError {
    /// The venue could not be reached.
    #[error("market data unavailable: {0}")]
    Unavailable(String),

    /// The venue rejected the request.
    #[error("market data request rejected: {0}")]
    Rejected(String),

    /// The venue reply could not be interpreted.
    #[error("malformed market data: {0}")]
    Malformed(String),
}

impl MarketDataError {
    /// Whether the failure was caused by the request itself, such as an
    /// unknown symbol, rather than by the venue or the relay.
    #[must_use]
    pub const fn is_request_fault(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

/// Source of orderbook snapshots.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the latest snapshot for `symbol`.
    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError>;
}

/// Push failure for a single snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    /// The connection has already closed.
    #[error("connection closed")]
    Closed,

    /// The snapshot could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Destination for snapshot pushes.
///
/// Implementations must fail safely when the underlying connection is gone.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    /// Push one snapshot.
    async fn push(&self, snapshot: &Snapshot) -> Result<(), PushError>;
}
