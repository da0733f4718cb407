//! Relay Wire Codec
//!
//! JSON text frames exchanged between relay clients and the relay server.
//!
//! - **Client → Server**: `{"action":"subscribe","symbol":"BTC-PERPETUAL"}`
//! - **Server → Client**: orderbook snapshots, see [`Snapshot`]

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::orderbook::Snapshot;
use crate::domain::subscription::Symbol;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is valid JSON but not an object.
    #[error("invalid frame format: expected JSON object")]
    NotAnObject,

    /// Required field is absent or not a string.
    #[error("missing or non-string field: {0}")]
    MissingField(&'static str),

    /// Unknown control action.
    #[error("unknown action: {0}")]
    UnknownAction(String),

    /// Symbol is empty or whitespace.
    #[error("symbol cannot be empty")]
    EmptySymbol,
}

/// Subscription control message sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Start receiving snapshots for a symbol.
    Subscribe {
        /// Instrument name.
        symbol: Symbol,
    },
    /// Stop receiving snapshots for a symbol.
    Unsubscribe {
        /// Instrument name.
        symbol: Symbol,
    },
}

impl ControlMessage {
    /// Build a subscribe message.
    #[must_use]
    pub fn subscribe(symbol: impl Into<Symbol>) -> Self {
        Self::Subscribe {
            symbol: symbol.into(),
        }
    }

    /// Build an unsubscribe message.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<Symbol>) -> Self {
        Self::Unsubscribe {
            symbol: symbol.into(),
        }
    }

    /// Symbol the message refers to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Subscribe { symbol } | Self::Unsubscribe { symbol } => symbol,
        }
    }
}

/// JSON codec for relay frames.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a client control frame.
    ///
    /// Extra fields are ignored. Whitespace around the symbol is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON, a missing `action`/`symbol`,
    /// an unknown action or an empty symbol.
    pub fn decode_control(&self, text: &str) -> Result<ControlMessage, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let object = value.as_object().ok_or(CodecError::NotAnObject)?;

        let action = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("action"))?;

        if !matches!(action, "subscribe" | "unsubscribe") {
            return Err(CodecError::UnknownAction(action.to_string()));
        }

        let symbol = object
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingField("symbol"))?
            .trim();

        if symbol.is_empty() {
            return Err(CodecError::EmptySymbol);
        }

        Ok(if action == "subscribe" {
            ControlMessage::subscribe(symbol)
        } else {
            ControlMessage::unsubscribe(symbol)
        })
    }

    /// Encode a control message.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_control(&self, message: &ControlMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Encode a snapshot push.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_snapshot(&self, snapshot: &Snapshot) -> Result<String, CodecError> {
        Ok(serde_json::to_string(snapshot)?)
    }

    /// Decode a snapshot push.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a snapshot.
    pub fn decode_snapshot(&self, text: &str) -> Result<Snapshot, CodecError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::orderbook::PriceLevel;
    use rust_decimal::Decimal;
    use test_case::test_case;

    #[test]
    fn decode_subscribe() {
        let codec = JsonCodec::new();

        let msg = codec
            .decode_control(r#"{"action":"subscribe","symbol":"BTC-PERPETUAL"}"#)
            .unwrap();

        assert_eq!(msg, ControlMessage::subscribe("BTC-PERPETUAL"));
        assert_eq!(msg.symbol(), "BTC-PERPETUAL");
    }

    #[test]
    fn decode_pretty_printed_unsubscribe() {
        let codec = JsonCodec::new();
        let json = "{\n   \"action\" : \"unsubscribe\",\n   \"symbol\" : \"ETH-PERPETUAL\"\n}\n";

        let msg = codec.decode_control(json).unwrap();

        assert_eq!(msg, ControlMessage::unsubscribe("ETH-PERPETUAL"));
    }

    #[test_case(r#"{"action":"bogus"}"#; "unknown action")]
    #[test_case(r#"{"action":"bogus","symbol":"BTC-PERPETUAL"}"#; "unknown action with symbol")]
    #[test_case(r#"{"symbol":"BTC-PERPETUAL"}"#; "missing action")]
    #[test_case(r#"{"action":"subscribe"}"#; "missing symbol")]
    #[test_case(r#"{"action":"subscribe","symbol":42}"#; "numeric symbol")]
    #[test_case(r#"{"action":"subscribe","symbol":"  "}"#; "blank symbol")]
    #[test_case(r#"["subscribe","BTC-PERPETUAL"]"#; "array frame")]
    #[test_case("not json"; "garbage")]
    fn decode_rejects_malformed(frame: &str) {
        assert!(JsonCodec::new().decode_control(frame).is_err());
    }

    #[test]
    fn unknown_action_is_reported_by_name() {
        let err = JsonCodec::new()
            .decode_control(r#"{"action":"bogus"}"#)
            .unwrap_err();

        assert!(matches!(err, CodecError::UnknownAction(ref a) if a == "bogus"));
    }

    #[test]
    fn encode_control_uses_action_tag() {
        let json = JsonCodec::new()
            .encode_control(&ControlMessage::subscribe("BTC-PERPETUAL"))
            .unwrap();

        assert_eq!(json, r#"{"action":"subscribe","symbol":"BTC-PERPETUAL"}"#);
    }

    #[test]
    fn snapshot_round_trip() {
        let codec = JsonCodec::new();
        let snapshot = Snapshot::new(
            "T1",
            vec![PriceLevel::new(Decimal::new(1005, 1), Decimal::new(20, 1))],
            vec![PriceLevel::new(Decimal::new(1010, 1), Decimal::new(15, 1))],
        );

        let text = codec.encode_snapshot(&snapshot).unwrap();
        let decoded = codec.decode_snapshot(&text).unwrap();

        assert_eq!(decoded, snapshot);
    }
}
