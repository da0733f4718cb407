//! Relay WebSocket Transport
//!
//! Server and client ends of the relay protocol plus the JSON frame codec
//! they share.

pub mod client;
pub mod codec;
pub mod server;

pub use client::{ClientError, ClientEvent, RelayClient, render_snapshot};
pub use codec::{CodecError, ControlMessage, JsonCodec};
pub use server::{
    ConnectionHandle, DEFAULT_OUTBOUND_CAPACITY, RelayServer, RelayServerConfig,
    RelayServerError, RelayStats,
};
