//! Domain Layer - Core relay types and business logic.
//!
//! This layer contains the orderbook snapshot types and the subscription
//! registry. Nothing here touches the network.

/// Orderbook snapshot types.
pub mod orderbook;

/// Subscription tracking.
pub mod subscription;
