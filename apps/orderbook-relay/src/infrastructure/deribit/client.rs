//! Deribit JSON-RPC client.
//!
//! Every call is a single HTTP POST carrying a JSON-RPC 2.0 envelope. Once
//! [`DeribitClient::authenticate`] succeeds, the bearer token is attached to
//! all later requests. Tokens are never refreshed.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::config::DeribitConfig;
use super::error::DeribitError;
use super::messages::{
    AccessToken, AuthParams, AuthResult, CancelParams, EditParams, Order, OrderBook,
    OrderBookParams, OrderRequest, OrderResponse, Position, PositionsParams, RpcRequest,
    RpcResponse,
};
use crate::application::ports::{MarketDataError, MarketDataSource};
use crate::domain::orderbook::Snapshot;
use crate::infrastructure::config::Credentials;

/// HTTP client for the Deribit v2 API.
#[derive(Debug)]
pub struct DeribitClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<AccessToken>>,
    next_id: AtomicU64,
}

impl DeribitClient {
    /// Create an unauthenticated client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DeribitConfig) -> Result<Self, DeribitError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeribitError::ClientBuild(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            token: RwLock::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    /// Whether a bearer token is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.read().is_some()
    }

    /// Exchange client credentials for a bearer token (`public/auth`).
    ///
    /// # Errors
    ///
    /// Returns [`DeribitError::AuthenticationFailed`] if the venue refuses
    /// the credentials or the reply carries no token.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<AccessToken, DeribitError> {
        let params = AuthParams {
            grant_type: "client_credentials",
            client_id: credentials.client_id(),
            client_secret: credentials.client_secret(),
        };

        let result: AuthResult = match self.call("public/auth", &params).await {
            Ok(result) => result,
            Err(DeribitError::Rpc { code, message }) => {
                return Err(DeribitError::AuthenticationFailed(format!(
                    "{code}: {message}"
                )));
            }
            Err(e) => return Err(e),
        };

        let token = result
            .access_token
            .filter(|t| !t.is_empty())
            .map(|t| AccessToken::new(t, result.expires_in))
            .ok_or_else(|| DeribitError::AuthenticationFailed("missing access_token".into()))?;

        *self.token.write() = Some(token.clone());
        tracing::info!(
            expires_in = token.expires_in(),
            scope = result.scope.as_deref().unwrap_or_default(),
            "Authenticated with Deribit"
        );
        Ok(token)
    }

    /// Latest orderbook for an instrument (`public/get_order_book`).
    ///
    /// # Errors
    ///
    /// Returns an error on transport, RPC or parse failure.
    pub async fn get_order_book(&self, instrument: &str) -> Result<OrderBook, DeribitError> {
        self.call(
            "public/get_order_book",
            &OrderBookParams {
                instrument_name: instrument,
            },
        )
        .await
    }

    /// Place an order (`private/buy` or `private/sell`).
    ///
    /// # Errors
    ///
    /// Returns [`DeribitError::NotAuthenticated`] without a token, otherwise
    /// any transport, RPC or parse failure.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<OrderResponse, DeribitError> {
        self.require_token()?;
        let response: OrderResponse = self.call(order.side.method(), &order.params()).await?;

        tracing::info!(
            order_id = %response.order.order_id,
            instrument = %order.instrument_name,
            state = %response.order.order_state,
            "Order placed"
        );
        Ok(response)
    }

    /// Cancel an order (`private/cancel`).
    ///
    /// # Errors
    ///
    /// Returns [`DeribitError::NotAuthenticated`] without a token, otherwise
    /// any transport, RPC or parse failure.
    pub async fn cancel_order(&self, order_id: &str) -> Result<Order, DeribitError> {
        self.require_token()?;
        self.call("private/cancel", &CancelParams { order_id }).await
    }

    /// Change an order's price and/or amount (`private/edit`).
    ///
    /// Non-positive values are left out of the request.
    ///
    /// # Errors
    ///
    /// Returns [`DeribitError::NotAuthenticated`] without a token, otherwise
    /// any transport, RPC or parse failure.
    pub async fn modify_order(
        &self,
        order_id: &str,
        new_price: rust_decimal::Decimal,
        new_amount: rust_decimal::Decimal,
    ) -> Result<OrderResponse, DeribitError> {
        self.require_token()?;
        self.call(
            "private/edit",
            &EditParams::new(order_id, new_price, new_amount),
        )
        .await
    }

    /// Open positions in a currency (`private/get_positions`).
    ///
    /// # Errors
    ///
    /// Returns [`DeribitError::NotAuthenticated`] without a token, otherwise
    /// any transport, RPC or parse failure.
    pub async fn get_positions(
        &self,
        currency: &str,
        kind: Option<&str>,
    ) -> Result<Vec<Position>, DeribitError> {
        self.require_token()?;
        self.call(
            "private/get_positions",
            &PositionsParams {
                currency,
                kind: kind.filter(|k| !k.is_empty()),
            },
        )
        .await
    }

    fn require_token(&self) -> Result<(), DeribitError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(DeribitError::NotAuthenticated)
        }
    }

    /// Send one JSON-RPC call and unwrap its result member.
    #[allow(clippy::future_not_send)]
    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<T, DeribitError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);

        let token = self.token.read().clone();
        let mut builder = self.http.post(&self.base_url).json(&request);
        if let Some(token) = &token {
            builder = builder.bearer_auth(token.as_str());
        }

        tracing::debug!(id, method, "Deribit request");

        let response = builder
            .send()
            .await
            .map_err(|e| DeribitError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeribitError::Network(e.to_string()))?;

        // Deribit reports RPC errors with a 4xx status and a JSON-RPC body
        let envelope: RpcResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(DeribitError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => return Err(DeribitError::JsonParse(e.to_string())),
        };

        if let Some(error) = envelope.error {
            tracing::debug!(id, method, code = error.code, message = %error.message, "Deribit RPC error");
            return Err(DeribitError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        envelope
            .result
            .ok_or_else(|| DeribitError::JsonParse(format!("{method}: missing result")))
    }
}

/// Convert a venue orderbook into a relay snapshot.
///
/// # Errors
///
/// Returns [`MarketDataError::Malformed`] for an out-of-range timestamp.
pub fn to_snapshot(book: OrderBook) -> Result<Snapshot, MarketDataError> {
    let timestamp = DateTime::from_timestamp_millis(book.timestamp)
        .ok_or_else(|| {
            MarketDataError::Malformed(format!("timestamp out of range: {}", book.timestamp))
        })?
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    Ok(Snapshot::new(timestamp, book.bids, book.asks))
}

#[async_trait]
impl MarketDataSource for DeribitClient {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        let book = self.get_order_book(symbol).await?;
        to_snapshot(book)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::domain::orderbook::PriceLevel;
    use crate::infrastructure::deribit::OrderSide;

    fn client(server: &MockServer) -> DeribitClient {
        DeribitClient::new(&DeribitConfig::new(server.uri()).with_timeout(Duration::from_secs(2)))
            .unwrap()
    }

    fn credentials() -> Credentials {
        Credentials::new("id".to_string(), "secret".to_string())
    }

    fn ok(id: u64, result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        }))
    }

    async fn mount_auth(server: &MockServer) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "public/auth"})))
            .respond_with(ok(
                1,
                json!({"access_token": "tok", "expires_in": 900, "scope": "session:test"}),
            ))
            .mount(server)
            .await;
    }

    async fn request_bodies(server: &MockServer) -> Vec<Value> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn authenticate_sends_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "public/auth",
                "params": {
                    "grant_type": "client_credentials",
                    "client_id": "id",
                    "client_secret": "secret"
                }
            })))
            .respond_with(ok(1, json!({"access_token": "tok", "expires_in": 900})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let token = client.authenticate(&credentials()).await.unwrap();

        assert_eq!(token.as_str(), "tok");
        assert_eq!(token.expires_in(), Some(900));
        assert!(client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_error_member_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": 13_004, "message": "invalid_credentials"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client.authenticate(&credentials()).await.unwrap_err();

        assert!(matches!(err, DeribitError::AuthenticationFailed(ref m) if m.contains("invalid_credentials")));
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn authenticate_without_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok(1, json!({"expires_in": 900})))
            .mount(&server)
            .await;

        let err = client(&server).authenticate(&credentials()).await.unwrap_err();

        assert!(matches!(err, DeribitError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn private_call_before_auth_sends_nothing() {
        let server = MockServer::start().await;
        let client = client(&server);

        let err = client.cancel_order("abc").await.unwrap_err();

        assert_eq!(err, DeribitError::NotAuthenticated);
        assert!(request_bodies(&server).await.is_empty());
    }

    #[tokio::test]
    async fn fetch_snapshot_converts_order_book() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "public/get_order_book",
                "params": {"instrument_name": "BTC-PERPETUAL"}
            })))
            .respond_with(ok(
                1,
                json!({
                    "instrument_name": "BTC-PERPETUAL",
                    "timestamp": 1_700_000_000_123_i64,
                    "bids": [[100.5, 2.0], [100.0, 1.0]],
                    "asks": [[101.0, 1.5]]
                }),
            ))
            .mount(&server)
            .await;

        let snapshot = client(&server).fetch_snapshot("BTC-PERPETUAL").await.unwrap();

        assert_eq!(snapshot.timestamp, "2023-11-14T22:13:20.123Z");
        assert_eq!(
            snapshot.bids,
            vec![
                PriceLevel::new(Decimal::new(1005, 1), Decimal::new(2, 0)),
                PriceLevel::new(Decimal::new(100, 0), Decimal::new(1, 0)),
            ]
        );
        assert_eq!(
            snapshot.asks,
            vec![PriceLevel::new(Decimal::new(101, 0), Decimal::new(15, 1))]
        );
    }

    #[tokio::test]
    async fn fetch_snapshot_maps_rpc_error_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32_602, "message": "Invalid params"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_snapshot("NOPE").await.unwrap_err();

        assert!(matches!(err, MarketDataError::Rejected(ref m) if m.contains("Invalid params")));
    }

    #[tokio::test]
    async fn fetch_snapshot_unreachable_is_unavailable() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let client = DeribitClient::new(
            &DeribitConfig::new(format!("http://{addr}")).with_timeout(Duration::from_secs(2)),
        )
        .unwrap();

        let err = client.fetch_snapshot("BTC-PERPETUAL").await.unwrap_err();

        assert!(matches!(err, MarketDataError::Unavailable(_)));
    }

    #[tokio::test]
    async fn garbage_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_snapshot("BTC-PERPETUAL").await.unwrap_err();

        assert!(matches!(err, MarketDataError::Malformed(_)));
    }

    #[tokio::test]
    async fn place_order_uses_side_method_and_bearer_token() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(json!({"method": "private/buy"})))
            .respond_with(ok(
                2,
                json!({
                    "order": {"order_id": "ETH-1", "order_state": "open", "amount": 1.0},
                    "trades": []
                }),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        client.authenticate(&credentials()).await.unwrap();
        let response = client
            .place_order(&OrderRequest::limit(
                "BTC-PERPETUAL",
                OrderSide::Buy,
                Decimal::ONE,
                Decimal::new(50_000, 0),
            ))
            .await
            .unwrap();

        assert_eq!(response.order.order_id, "ETH-1");
        assert_eq!(response.order.order_state, "open");

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies[1]["params"]["price"], json!(50000.0));
        assert_eq!(bodies[1]["params"]["type"], "limit");
    }

    #[tokio::test]
    async fn market_order_omits_price() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "private/sell"})))
            .respond_with(ok(
                2,
                json!({"order": {"order_id": "1", "order_state": "filled"}}),
            ))
            .mount(&server)
            .await;

        let client = client(&server);
        client.authenticate(&credentials()).await.unwrap();
        client
            .place_order(&OrderRequest::market(
                "BTC-PERPETUAL",
                OrderSide::Sell,
                Decimal::TEN,
            ))
            .await
            .unwrap();

        let bodies = request_bodies(&server).await;
        assert!(bodies[1]["params"].get("price").is_none());
        assert_eq!(bodies[1]["params"]["type"], "market");
    }

    #[tokio::test]
    async fn modify_order_sends_only_positive_values() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "private/edit"})))
            .respond_with(ok(
                2,
                json!({"order": {"order_id": "abc", "order_state": "open"}, "trades": []}),
            ))
            .mount(&server)
            .await;

        let client = client(&server);
        client.authenticate(&credentials()).await.unwrap();
        client
            .modify_order("abc", Decimal::new(51_000, 0), Decimal::ZERO)
            .await
            .unwrap();

        let bodies = request_bodies(&server).await;
        assert_eq!(
            bodies[1]["params"],
            json!({"order_id": "abc", "price": 51000.0})
        );
    }

    #[tokio::test]
    async fn cancel_and_positions() {
        let server = MockServer::start().await;
        mount_auth(&server).await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "private/cancel"})))
            .respond_with(ok(
                2,
                json!({"order_id": "abc", "order_state": "cancelled"}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "private/get_positions"})))
            .respond_with(ok(
                3,
                json!([{
                    "instrument_name": "BTC-PERPETUAL",
                    "direction": "buy",
                    "kind": "future",
                    "size": 10.0,
                    "average_price": 50_000.5
                }]),
            ))
            .mount(&server)
            .await;

        let client = client(&server);
        client.authenticate(&credentials()).await.unwrap();

        let order = client.cancel_order("abc").await.unwrap();
        assert_eq!(order.order_state, "cancelled");

        let positions = client.get_positions("BTC", None).await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].size, Some(Decimal::TEN));

        client.get_positions("BTC", Some("future")).await.unwrap();

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies[2]["params"], json!({"currency": "BTC"}));
        assert_eq!(bodies[3]["params"], json!({"currency": "BTC", "kind": "future"}));
    }

    #[tokio::test]
    async fn request_ids_increase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ok(
                0,
                json!({"instrument_name": "X", "timestamp": 0, "bids": [], "asks": []}),
            ))
            .mount(&server)
            .await;

        let client = client(&server);
        client.get_order_book("X").await.unwrap();
        client.get_order_book("X").await.unwrap();

        let ids: Vec<_> = request_bodies(&server)
            .await
            .iter()
            .map(|b| b["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn out_of_range_timestamp_is_malformed() {
        let book = OrderBook {
            instrument_name: "X".to_string(),
            timestamp: i64::MAX,
            bids: vec![],
            asks: vec![],
            state: None,
            best_bid_price: None,
            best_ask_price: None,
            mark_price: None,
        };

        assert!(matches!(to_snapshot(book), Err(MarketDataError::Malformed(_))));
    }
}
