//! Subscription Registry
//!
//! Tracks which symbols each relay connection currently wants. Membership of
//! a (connection, symbol) pair in the registry is the only authority on
//! whether snapshots for that pair should keep flowing.
//!
//! # Design
//!
//! - One map from connection to its symbols, behind a single lock, so
//!   dropping a connection removes all of its pairs in one step.
//! - Each membership carries a generation. A pump holds a [`Subscription`]
//!   lease and stops as soon as the pair is gone or was re-created under a
//!   newer generation.
//! - The registry keys by [`ConnectionId`] only. It never owns the socket.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;

// =============================================================================
// Types
// =============================================================================

/// A symbol string (Deribit instrument name).
pub type Symbol = String;

/// Opaque identifier for one live relay connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a fresh random connection id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }

    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Lease handed out when a (connection, symbol) pair is first subscribed.
///
/// Owned by the pump serving the pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    connection: ConnectionId,
    symbol: Symbol,
    generation: u64,
}

impl Subscription {
    /// Connection the lease belongs to.
    #[must_use]
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Subscribed symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

// =============================================================================
// Registry State
// =============================================================================

#[derive(Debug, Default)]
struct RegistryState {
    /// Map from connection to its symbols and their generations.
    connections: HashMap<ConnectionId, HashMap<Symbol, u64>>,
    /// Last generation handed out.
    next_generation: u64,
}

impl RegistryState {
    fn add(&mut self, connection: ConnectionId, symbol: &str) -> Option<u64> {
        let symbols = self.connections.entry(connection).or_default();
        if symbols.contains_key(symbol) {
            return None;
        }

        self.next_generation += 1;
        symbols.insert(symbol.to_string(), self.next_generation);
        Some(self.next_generation)
    }

    fn remove(&mut self, connection: ConnectionId, symbol: &str) -> bool {
        let Some(symbols) = self.connections.get_mut(&connection) else {
            return false;
        };

        let removed = symbols.remove(symbol).is_some();

        // Clean up empty connection entry
        if symbols.is_empty() {
            self.connections.remove(&connection);
        }

        removed
    }

    fn generation(&self, connection: ConnectionId, symbol: &str) -> Option<u64> {
        self.connections
            .get(&connection)
            .and_then(|symbols| symbols.get(symbol))
            .copied()
    }
}

// =============================================================================
// Subscription Registry
// =============================================================================

/// Thread-safe registry of active (connection, symbol) subscriptions.
///
/// # Example
///
/// ```rust
/// use orderbook_relay::domain::subscription::{ConnectionId, SubscriptionRegistry};
///
/// let registry = SubscriptionRegistry::new();
/// let conn = ConnectionId::from_raw(1);
///
/// // First subscribe hands out a lease
/// let lease = registry.subscribe(conn, "BTC-PERPETUAL").unwrap();
/// assert!(registry.is_current(&lease));
///
/// // Subscribing again is a no-op
/// assert!(registry.subscribe(conn, "BTC-PERPETUAL").is_none());
///
/// // Unsubscribing invalidates the lease
/// registry.unsubscribe(conn, "BTC-PERPETUAL");
/// assert!(!registry.is_current(&lease));
/// ```
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `symbol` to the connection's set.
    ///
    /// Returns a lease only when the pair was not already present; the caller
    /// starts a pump for it. Duplicates return `None`.
    pub fn subscribe(&self, connection: ConnectionId, symbol: &str) -> Option<Subscription> {
        let generation = self.state.write().add(connection, symbol)?;

        Some(Subscription {
            connection,
            symbol: symbol.to_string(),
            generation,
        })
    }

    /// Remove `symbol` from the connection's set.
    ///
    /// Returns whether the pair was present.
    pub fn unsubscribe(&self, connection: ConnectionId, symbol: &str) -> bool {
        self.state.write().remove(connection, symbol)
    }

    /// Whether the connection is currently subscribed to `symbol`.
    #[must_use]
    pub fn is_active(&self, connection: ConnectionId, symbol: &str) -> bool {
        self.state.read().generation(connection, symbol).is_some()
    }

    /// Whether the lease still names the live subscription for its pair.
    #[must_use]
    pub fn is_current(&self, lease: &Subscription) -> bool {
        self.state.read().generation(lease.connection, &lease.symbol) == Some(lease.generation)
    }

    /// Remove every subscription of a closed connection.
    ///
    /// Returns the removed symbols.
    pub fn drop_connection(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.state
            .write()
            .connections
            .remove(&connection)
            .map(|symbols| symbols.into_keys().collect())
            .unwrap_or_default()
    }

    /// Symbols a connection is subscribed to.
    #[must_use]
    pub fn symbols_for(&self, connection: ConnectionId) -> Vec<Symbol> {
        self.state
            .read()
            .connections
            .get(&connection)
            .map(|symbols| symbols.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Current registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        RegistryStats {
            connection_count: state.connections.len(),
            subscription_count: state.connections.values().map(HashMap::len).sum(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Connections with at least one subscription.
    pub connection_count: usize,
    /// Total (connection, symbol) pairs.
    pub subscription_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
