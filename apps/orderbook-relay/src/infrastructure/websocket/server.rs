//! Relay WebSocket Server
//!
//! Accepts client connections, applies their subscribe/unsubscribe control
//! messages to the registry and starts an update pump for every new
//! (connection, symbol) pair.
//!
//! # Connection Model
//!
//! Each connection runs on its own task. A writer task owns the socket sink
//! and drains a bounded outbound queue; pumps push through a
//! [`ConnectionHandle`] holding a clone of the queue sender. When the
//! connection ends its subscriptions are dropped from the registry before
//! the handle is closed, so no pump outlives its pair by more than one poll.
//!
//! A client that stops reading cannot pin its connection: closing the handle
//! interrupts a blocked write, and the final Close frame gets
//! [`CLOSE_FLUSH_TIMEOUT`] to go out.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::codec::{CodecError, ControlMessage, JsonCodec};
use crate::application::ports::{PushError, SnapshotSink};
use crate::application::services::PumpSet;
use crate::domain::orderbook::Snapshot;
use crate::domain::subscription::{ConnectionId, SubscriptionRegistry};
use crate::infrastructure::metrics::{self, ControlAction};

// =============================================================================
// Error Type
// =============================================================================

/// Errors raised while setting up the relay listener.
#[derive(Debug, thiserror::Error)]
pub enum RelayServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The bound address could not be read back.
    #[error("failed to read local address: {0}")]
    LocalAddr(#[source] std::io::Error),
}

// =============================================================================
// Configuration
// =============================================================================

/// Default per-connection outbound queue capacity.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Time allowed for the Close frame once a connection starts closing.
pub const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Relay server settings.
#[derive(Debug, Clone, Copy)]
pub struct RelayServerConfig {
    /// Frames buffered per connection before pushes wait.
    pub outbound_capacity: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

// =============================================================================
// Connection Handle
// =============================================================================

/// Outbound side of one client connection.
///
/// Never owns the socket. Once closed, every push fails with
/// [`PushError::Closed`].
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Message>,
    closed: CancellationToken,
    codec: JsonCodec,
}

impl ConnectionHandle {
    /// Wrap an outbound queue sender.
    #[must_use]
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            tx,
            closed: CancellationToken::new(),
            codec: JsonCodec::new(),
        }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Mark the connection closed and signal the writer to stop.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether the connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection closes.
    #[must_use]
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Queue a raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the connection is gone.
    pub async fn send(&self, message: Message) -> Result<(), PushError> {
        if self.is_closed() {
            return Err(PushError::Closed);
        }

        tokio::select! {
            () = self.closed.cancelled() => Err(PushError::Closed),
            sent = self.tx.send(message) => sent.map_err(|_| PushError::Closed),
        }
    }
}

#[async_trait]
impl SnapshotSink for ConnectionHandle {
    async fn push(&self, snapshot: &Snapshot) -> Result<(), PushError> {
        let text = self
            .codec
            .encode_snapshot(snapshot)
            .map_err(|e| PushError::Encode(e.to_string()))?;

        self.send(Message::Text(text.into())).await
    }
}

// =============================================================================
// Relay Server
// =============================================================================

/// Point-in-time server counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RelayStats {
    /// Open client connections.
    pub connections: usize,
    /// Active (connection, symbol) subscriptions.
    pub subscriptions: usize,
    /// Pumps still running.
    pub active_pumps: usize,
    /// Inbound frames dropped as unusable since start.
    pub protocol_errors: u64,
}

/// WebSocket relay server.
pub struct RelayServer {
    config: RelayServerConfig,
    pumps: PumpSet,
    codec: JsonCodec,
    connections: AtomicUsize,
    protocol_errors: AtomicU64,
    connection_tasks: TaskTracker,
}

impl RelayServer {
    /// Create a server driving pumps from `pumps`.
    #[must_use]
    pub fn new(config: RelayServerConfig, pumps: PumpSet) -> Self {
        Self {
            config,
            pumps,
            codec: JsonCodec::new(),
            connections: AtomicUsize::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_tasks: TaskTracker::new(),
        }
    }

    /// Shared subscription registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.pumps.registry()
    }

    /// Pump set owned by the server.
    #[must_use]
    pub const fn pumps(&self) -> &PumpSet {
        &self.pumps
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            connections: self.connections.load(Ordering::Relaxed),
            subscriptions: self.registry().stats().subscription_count,
            active_pumps: self.pumps.active(),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
        }
    }

    /// Bind the relay listener.
    ///
    /// # Errors
    ///
    /// Returns [`RelayServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(addr: SocketAddr) -> Result<TcpListener, RelayServerError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| RelayServerError::BindFailed { addr, source })
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// Returns once every connection task has finished. Pumps may still be
    /// draining; see [`PumpSet::wait_idle`].
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's address cannot be read.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), RelayServerError> {
        let local_addr = listener.local_addr().map_err(RelayServerError::LocalAddr)?;
        tracing::info!(addr = %local_addr, "Relay server listening");

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Relay server no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        let shutdown = shutdown.clone();
                        self.connection_tasks.spawn(async move {
                            server.handle_connection(stream, peer, shutdown).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                    }
                }
            }
        }

        self.connection_tasks.close();
        self.connection_tasks.wait().await;

        tracing::info!("Relay server stopped");
        Ok(())
    }

    /// Serve a single client until it disconnects or the server shuts down.
    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "WebSocket handshake failed");
                return;
            }
        };

        let conn_id = ConnectionId::generate();
        let (write, mut read) = ws_stream.split();
        let (tx, rx) = mpsc::channel(self.config.outbound_capacity.max(1));
        let handle = Arc::new(ConnectionHandle::new(conn_id, tx));

        let mut writer = tokio::spawn(write_loop(write, rx, handle.closed_token()));

        self.connections.fetch_add(1, Ordering::Relaxed);
        metrics::connection_opened();
        tracing::info!(%conn_id, %peer, "Client connected");

        loop {
            let frame = tokio::select! {
                () = shutdown.cancelled() => break,
                () = handle.closed.cancelled() => break,
                frame = read.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = self.handle_frame(&handle, &text);
                }
                Some(Ok(Message::Ping(data))) => {
                    let pong = tokio::select! {
                        () = shutdown.cancelled() => break,
                        sent = handle.send(Message::Pong(data)) => sent,
                    };
                    if pong.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Binary(data))) => self.ignore_binary(conn_id, data.len()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(%conn_id, error = %e, "Connection error");
                    break;
                }
            }
        }

        // Registry first so pumps stop before the outbound side goes away
        let dropped = self.registry().drop_connection(conn_id);
        handle.close();
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT * 2, &mut writer)
            .await
            .is_err()
        {
            tracing::debug!(%conn_id, "Writer did not stop in time, aborting");
            writer.abort();
        }

        self.connections.fetch_sub(1, Ordering::Relaxed);
        metrics::connection_closed();
        metrics::set_subscriptions(self.registry().stats().subscription_count);
        tracing::info!(%conn_id, dropped = dropped.len(), "Client disconnected");
    }

    /// Apply one inbound text frame.
    ///
    /// Malformed frames are logged, counted and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns the decode error for a malformed frame.
    pub fn handle_frame(
        &self,
        handle: &Arc<ConnectionHandle>,
        text: &str,
    ) -> Result<ControlMessage, CodecError> {
        let conn_id = handle.id();
        let message = match self.codec.decode_control(text) {
            Ok(message) => message,
            Err(e) => {
                self.count_protocol_error();
                tracing::warn!(%conn_id, error = %e, "Ignoring malformed control frame");
                return Err(e);
            }
        };

        match &message {
            ControlMessage::Subscribe { symbol } => {
                metrics::record_control_message(ControlAction::Subscribe);
                match self.registry().subscribe(conn_id, symbol) {
                    Some(lease) => {
                        tracing::info!(%conn_id, %symbol, "Subscribed");
                        self.pumps
                            .spawn(lease, Arc::clone(handle) as Arc<dyn SnapshotSink>);
                    }
                    None => {
                        tracing::debug!(%conn_id, %symbol, "Already subscribed");
                    }
                }
            }
            ControlMessage::Unsubscribe { symbol } => {
                metrics::record_control_message(ControlAction::Unsubscribe);
                if self.registry().unsubscribe(conn_id, symbol) {
                    tracing::info!(%conn_id, %symbol, "Unsubscribed");
                } else {
                    tracing::debug!(%conn_id, %symbol, "Unsubscribe for inactive symbol");
                }
            }
        }

        metrics::set_subscriptions(self.registry().stats().subscription_count);
        Ok(message)
    }
}

impl RelayServer {
    /// Drop a binary frame. The control protocol is text only.
    fn ignore_binary(&self, conn_id: ConnectionId, len: usize) {
        self.count_protocol_error();
        tracing::debug!(%conn_id, len, "Ignoring binary frame");
    }

    fn count_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_protocol_error();
    }
}

/// Drain the outbound queue into the socket until the connection closes.
///
/// Every write races the close signal, so a peer that stopped reading is
/// abandoned instead of holding the connection open.
async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::Receiver<Message>,
    closed: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };

        tokio::select! {
            () = closed.cancelled() => {
                tracing::debug!("Abandoning write to stalled peer");
                return;
            }
            sent = sink.send(message) => {
                if let Err(e) = sent {
                    tracing::debug!(error = %e, "Outbound write failed");
                    closed.cancel();
                    return;
                }
            }
        }
    }

    if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, sink.send(Message::Close(None)))
        .await
        .is_err()
    {
        tracing::debug!("Close frame not flushed in time");
    }
}

// =============================================================================
// Tests
// =============================================================================
