//! Deribit Venue Adapter
//!
//! JSON-RPC 2.0 over HTTPS for the Deribit v2 API:
//! - Client-credentials authentication
//! - Orderbook snapshots (implements [`MarketDataSource`](crate::application::ports::MarketDataSource))
//! - Order placement, editing and cancellation
//! - Position queries

mod client;
mod config;
mod error;
mod messages;

pub use client::{DeribitClient, to_snapshot};
pub use config::{DEFAULT_TIMEOUT, DeribitConfig};
pub use error::DeribitError;
pub use messages::{
    AccessToken, Order, OrderBook, OrderRequest, OrderResponse, OrderSide, OrderType, Position,
};
