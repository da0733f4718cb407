//! Deribit JSON-RPC request and response types.
//!
//! These types map directly to Deribit's v2 API format.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::orderbook::PriceLevel;

// ============================================================================
// Envelope
// ============================================================================

/// JSON-RPC 2.0 request envelope.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a, P> {
    /// Protocol version, always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Request id.
    pub id: u64,
    /// Method name, e.g. `public/get_order_book`.
    pub method: &'a str,
    /// Method parameters.
    pub params: P,
}

impl<'a, P: Serialize> RpcRequest<'a, P> {
    /// Build a request.
    pub const fn new(id: u64, method: &'a str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Deserialize)]
pub struct RpcResponse<T> {
    /// Echoed request id.
    pub id: Option<u64>,
    /// Result member on success.
    pub result: Option<T>,
    /// Error member on failure.
    pub error: Option<RpcErrorBody>,
}

/// JSON-RPC error member.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

// ============================================================================
// Authentication
// ============================================================================

/// `public/auth` parameters.
#[derive(Debug, Serialize)]
pub struct AuthParams<'a> {
    /// Always `client_credentials`.
    pub grant_type: &'static str,
    /// API client id.
    pub client_id: &'a str,
    /// API client secret.
    pub client_secret: &'a str,
}

/// `public/auth` result.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResult {
    /// Bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Granted scope.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Bearer token returned by authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_in: Option<u64>,
}

impl AccessToken {
    /// Wrap a raw token.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            token: token.into(),
            expires_in,
        }
    }

    /// Raw token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// Lifetime in seconds as reported by the venue.
    #[must_use]
    pub const fn expires_in(&self) -> Option<u64> {
        self.expires_in
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

// ============================================================================
// Market Data
// ============================================================================

/// `public/get_order_book` parameters.
#[derive(Debug, Serialize)]
pub struct OrderBookParams<'a> {
    /// Instrument name.
    pub instrument_name: &'a str,
}

/// `public/get_order_book` result.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    /// Instrument name.
    pub instrument_name: String,
    /// Venue timestamp in milliseconds since the epoch.
    pub timestamp: i64,
    /// Bid levels, best first.
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best first.
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
    /// Instrument state (`open`, `closed`).
    #[serde(default)]
    pub state: Option<String>,
    /// Best bid price.
    #[serde(default)]
    pub best_bid_price: Option<Decimal>,
    /// Best ask price.
    #[serde(default)]
    pub best_ask_price: Option<Decimal>,
    /// Mark price.
    #[serde(default)]
    pub mark_price: Option<Decimal>,
}

// ============================================================================
// Orders
// ============================================================================

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    /// Buy (`private/buy`).
    Buy,
    /// Sell (`private/sell`).
    Sell,
}

impl OrderSide {
    /// JSON-RPC method for this side.
    #[must_use]
    pub const fn method(self) -> &'static str {
        match self {
            Self::Buy => "private/buy",
            Self::Sell => "private/sell",
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    /// Limit order; carries a price.
    Limit,
    /// Market order; never carries a price.
    Market,
}

/// New order request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Instrument name.
    pub instrument_name: String,
    /// Direction.
    pub side: OrderSide,
    /// Order size.
    pub amount: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price.
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// Limit order.
    #[must_use]
    pub fn limit(
        instrument_name: impl Into<String>,
        side: OrderSide,
        amount: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            side,
            amount,
            order_type: OrderType::Limit,
            price: Some(price),
        }
    }

    /// Market order.
    #[must_use]
    pub fn market(instrument_name: impl Into<String>, side: OrderSide, amount: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            side,
            amount,
            order_type: OrderType::Market,
            price: None,
        }
    }

    /// Wire parameters. Price is only sent for limit orders.
    #[must_use]
    pub fn params(&self) -> PlaceOrderParams<'_> {
        PlaceOrderParams {
            instrument_name: &self.instrument_name,
            amount: self.amount,
            order_type: self.order_type,
            price: match self.order_type {
                OrderType::Limit => self.price,
                OrderType::Market => None,
            },
        }
    }
}

/// `private/buy` and `private/sell` parameters.
#[derive(Debug, Serialize)]
pub struct PlaceOrderParams<'a> {
    /// Instrument name.
    pub instrument_name: &'a str,
    /// Order size.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// Order type.
    #[serde(rename = "type")]
    pub order_type: OrderType,
    /// Limit price.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

/// `private/cancel` parameters.
#[derive(Debug, Serialize)]
pub struct CancelParams<'a> {
    /// Order to cancel.
    pub order_id: &'a str,
}

/// `private/edit` parameters.
#[derive(Debug, Serialize)]
pub struct EditParams<'a> {
    /// Order to edit.
    pub order_id: &'a str,
    /// New size, omitted unless positive.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount: Option<Decimal>,
    /// New price, omitted unless positive.
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
}

impl<'a> EditParams<'a> {
    /// Build edit parameters, dropping non-positive values.
    #[must_use]
    pub fn new(order_id: &'a str, new_price: Decimal, new_amount: Decimal) -> Self {
        Self {
            order_id,
            amount: (new_amount > Decimal::ZERO).then_some(new_amount),
            price: (new_price > Decimal::ZERO).then_some(new_price),
        }
    }
}

/// Order state as reported by the venue.
#[derive(Debug, Clone, Deserialize)]
pub struct Order {
    /// Venue order id.
    pub order_id: String,
    /// `open`, `filled`, `rejected`, `cancelled` or `untriggered`.
    pub order_state: String,
    /// Instrument name.
    #[serde(default)]
    pub instrument_name: Option<String>,
    /// `buy` or `sell`.
    #[serde(default)]
    pub direction: Option<String>,
    /// Order size.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Filled size.
    #[serde(default)]
    pub filled_amount: Option<Decimal>,
    /// Order type.
    #[serde(default)]
    pub order_type: Option<String>,
}

/// Result of placing or editing an order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    /// Order after the operation.
    pub order: Order,
    /// Fills produced by the operation.
    #[serde(default)]
    pub trades: Vec<serde_json::Value>,
}

// ============================================================================
// Positions
// ============================================================================

/// `private/get_positions` parameters.
#[derive(Debug, Serialize)]
pub struct PositionsParams<'a> {
    /// Currency, e.g. `BTC`.
    pub currency: &'a str,
    /// `future`, `option` and so on. Omitted when empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'a str>,
}

/// Open position.
#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    /// Instrument name.
    pub instrument_name: String,
    /// `buy`, `sell` or `zero`.
    #[serde(default)]
    pub direction: Option<String>,
    /// Instrument kind.
    #[serde(default)]
    pub kind: Option<String>,
    /// Position size.
    #[serde(default)]
    pub size: Option<Decimal>,
    /// Average entry price.
    #[serde(default)]
    pub average_price: Option<Decimal>,
    /// Mark price.
    #[serde(default)]
    pub mark_price: Option<Decimal>,
    /// Unrealized profit and loss.
    #[serde(default)]
    pub floating_profit_loss: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_shape() {
        let request = RpcRequest::new(
            7,
            "public/get_order_book",
            OrderBookParams {
                instrument_name: "BTC-PERPETUAL",
            },
        );

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "public/get_order_book",
                "params": {"instrument_name": "BTC-PERPETUAL"}
            })
        );
    }

    #[test]
    fn limit_order_carries_price() {
        let order = OrderRequest::limit(
            "BTC-PERPETUAL",
            OrderSide::Buy,
            Decimal::ONE,
            Decimal::new(50_000, 0),
        );

        assert_eq!(
            serde_json::to_value(order.params()).unwrap(),
            json!({
                "instrument_name": "BTC-PERPETUAL",
                "amount": 1.0,
                "type": "limit",
                "price": 50000.0
            })
        );
    }

    #[test]
    fn market_order_omits_price() {
        let mut order = OrderRequest::market("ETH-PERPETUAL", OrderSide::Sell, Decimal::TEN);
        order.price = Some(Decimal::ONE);

        let value = serde_json::to_value(order.params()).unwrap();

        assert_eq!(value["type"], "market");
        assert!(value.get("price").is_none());
        assert_eq!(order.side.method(), "private/sell");
    }

    #[test]
    fn edit_drops_non_positive_values() {
        let value =
            serde_json::to_value(EditParams::new("abc", Decimal::ZERO, Decimal::new(5, 0))).unwrap();

        assert_eq!(value, json!({"order_id": "abc", "amount": 5.0}));
    }

    #[test]
    fn order_book_parses_numeric_levels() {
        let book: OrderBook = serde_json::from_value(json!({
            "instrument_name": "BTC-PERPETUAL",
            "timestamp": 1_700_000_000_123_i64,
            "bids": [[100.5, 2.0], [100.0, 1.0]],
            "asks": [[101.0, 1.5]],
            "state": "open",
            "best_bid_price": 100.5,
            "best_ask_price": 101.0,
            "mark_price": 100.7,
            "stats": {"volume": 12.3}
        }))
        .unwrap();

        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[0].price, Decimal::new(1005, 1));
        assert_eq!(book.asks[0].size, Decimal::new(15, 1));
        assert_eq!(book.best_bid_price, Some(Decimal::new(1005, 1)));
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("secret-token", Some(900));

        let debug = format!("{token:?}");

        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("900"));
    }
}
