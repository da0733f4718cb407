//! Orderbook Snapshot Types
//!
//! Point-in-time orderbook views pushed to relay clients. Snapshots are
//! produced fresh by every poll and never mutated afterwards.
//!
//! # Wire Format
//!
//! ```json
//! {"timestamp":"2024-01-15T10:00:00.000Z","bids":[[100.5,2.0]],"asks":[[101.0,1.5]]}
//! ```
//!
//! Levels are two-element `[price, size]` arrays in venue priority order
//! (best first).

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

/// A single orderbook level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "(Decimal, Decimal)")]
pub struct PriceLevel {
    /// Level price.
    pub price: Decimal,
    /// Resting size at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new level.
    #[must_use]
    pub const fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

impl From<(Decimal, Decimal)> for PriceLevel {
    fn from((price, size): (Decimal, Decimal)) -> Self {
        Self { price, size }
    }
}

// Decimal serializes as a string by default; the wire wants bare numbers.
impl Serialize for PriceLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.price.to_f64().unwrap_or(f64::NAN))?;
        tuple.serialize_element(&self.size.to_f64().unwrap_or(f64::NAN))?;
        tuple.end()
    }
}

/// Immutable orderbook snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Venue timestamp of the snapshot.
    pub timestamp: String,
    /// Bid levels, best first.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    pub asks: Vec<PriceLevel>,
}

impl Snapshot {
    /// Create a snapshot.
    #[must_use]
    pub fn new(timestamp: impl Into<String>, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self {
            timestamp: timestamp.into(),
            bids,
            asks,
        }
    }

    /// Best (first) bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best (first) ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }
}
