//! Relay WebSocket Client
//!
//! Connects to a relay server, sends subscription control messages and
//! forwards decoded snapshot pushes as [`ClientEvent`]s.
//!
//! The live session (outbound sender plus background task handles) sits in
//! a single `Mutex<Option<Session>>`. Being connected and holding a usable
//! sender are therefore the same fact.

use std::fmt::Write as _;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, ControlMessage, JsonCodec};
use crate::domain::orderbook::{PriceLevel, Snapshot};
use crate::infrastructure::config::ClientSettings;

/// Time allowed for the Close frame to flush on [`RelayClient::close`].
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Outbound queue capacity.
const OUTBOUND_CAPACITY: usize = 64;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the relay client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// No live session.
    #[error("not connected")]
    NotConnected,

    /// A session is already open.
    #[error("already connected")]
    AlreadyConnected,

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The session ended before the frame was queued.
    #[error("failed to queue outbound frame")]
    SendFailed,
}

// =============================================================================
// Client Events
// =============================================================================

/// Events emitted by the relay client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Session established.
    Connected,
    /// Snapshot received.
    Snapshot(Snapshot),
    /// Session ended.
    Disconnected,
    /// Transport error on the session.
    Error(String),
}

// =============================================================================
// Relay Client
// =============================================================================

struct Session {
    id: u64,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
    writer: JoinHandle<()>,
}

/// Client for the orderbook relay.
pub struct RelayClient {
    settings: ClientSettings,
    codec: JsonCodec,
    event_tx: mpsc::Sender<ClientEvent>,
    session: Arc<Mutex<Option<Session>>>,
    next_session: AtomicU64,
}

impl RelayClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(settings: ClientSettings, event_tx: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            settings,
            codec: JsonCodec::new(),
            event_tx,
            session: Arc::new(Mutex::new(None)),
            next_session: AtomicU64::new(1),
        }
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Open a session with the relay.
    ///
    /// # Errors
    ///
    /// Returns an error if a session is already open, the handshake fails or
    /// it does not finish within the configured timeout.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        tracing::info!(url = %self.settings.url, "Connecting to relay");

        let timeout = self.settings.connect_timeout;
        let (ws_stream, _response) = tokio::time::timeout(
            timeout,
            tokio_tungstenite::connect_async(self.settings.url.as_str()),
        )
        .await
        .map_err(|_| ClientError::ConnectTimeout(timeout))??;

        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let cancel = CancellationToken::new();
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);

        {
            let mut guard = self.session.lock();
            if guard.is_some() {
                return Err(ClientError::AlreadyConnected);
            }

            let writer_cancel = cancel.clone();
            let writer = tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        biased;
                        () = writer_cancel.cancelled() => break,
                        message = rx.recv() => match message {
                            Some(message) => message,
                            None => return,
                        },
                    };

                    tokio::select! {
                        () = writer_cancel.cancelled() => return,
                        sent = write.send(message) => {
                            if let Err(e) = sent {
                                tracing::debug!(error = %e, "Outbound write failed");
                                writer_cancel.cancel();
                                return;
                            }
                        }
                    }
                }

                // Flush control frames queued before close
                let flush = async {
                    while let Ok(message) = rx.try_recv() {
                        write.send(message).await?;
                    }
                    write.send(Message::Close(None)).await
                };
                if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, flush).await.is_err() {
                    tracing::debug!("Close frame not flushed in time");
                }
            });

            *guard = Some(Session {
                id,
                tx: tx.clone(),
                cancel: cancel.clone(),
                writer,
            });
        }

        let codec = self.codec;
        let events = self.event_tx.clone();
        let session = Arc::clone(&self.session);
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    () = cancel.cancelled() => break,
                    frame = read.next() => frame,
                };

                match frame {
                    Some(Ok(Message::Text(text))) => match codec.decode_snapshot(&text) {
                        Ok(snapshot) => {
                            let _ = events.send(ClientEvent::Snapshot(snapshot)).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable frame");
                        }
                    },
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Relay closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Relay connection error");
                        let _ = events.send(ClientEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }

            // A newer session may already have replaced this one
            let ended = {
                let mut guard = session.lock();
                if guard.as_ref().is_some_and(|s| s.id == id) {
                    guard.take()
                } else {
                    None
                }
            };
            if let Some(ended) = ended {
                ended.cancel.cancel();
            }

            let _ = events.send(ClientEvent::Disconnected).await;
        });

        tracing::info!(url = %self.settings.url, "Connected to relay");
        let _ = self.event_tx.send(ClientEvent::Connected).await;
        Ok(())
    }

    /// Ask the relay for snapshots of `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a live session.
    pub async fn subscribe(&self, symbol: &str) -> Result<(), ClientError> {
        self.send_control(&ControlMessage::subscribe(symbol)).await
    }

    /// Stop snapshots for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] without a live session.
    pub async fn unsubscribe(&self, symbol: &str) -> Result<(), ClientError> {
        self.send_control(&ControlMessage::unsubscribe(symbol)).await
    }

    async fn send_control(&self, message: &ControlMessage) -> Result<(), ClientError> {
        let tx = {
            let guard = self.session.lock();
            match guard.as_ref() {
                Some(session) => session.tx.clone(),
                None => {
                    tracing::warn!(
                        symbol = message.symbol(),
                        "Cannot send control message: not connected"
                    );
                    return Err(ClientError::NotConnected);
                }
            }
        };

        let text = self.codec.encode_control(message)?;
        tx.send(Message::Text(text.into()))
            .await
            .map_err(|_| ClientError::SendFailed)?;

        tracing::debug!(symbol = message.symbol(), "Control message sent");
        Ok(())
    }

    /// Close the session. Does nothing when already closed.
    pub async fn close(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        session.cancel.cancel();
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, session.writer)
            .await
            .is_err()
        {
            tracing::debug!("Close frame not flushed in time");
        }

        tracing::info!("Relay session closed");
    }
}

impl Drop for RelayClient {
    fn drop(&mut self) {
        if let Some(session) = self.session.lock().take() {
            session.cancel.cancel();
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// Format a snapshot for terminal output.
#[must_use]
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    let mut out = format!("=== {} ===\n", snapshot.timestamp);
    render_side(&mut out, "bids", &snapshot.bids);
    render_side(&mut out, "asks", &snapshot.asks);
    out
}

fn render_side(out: &mut String, label: &str, levels: &[PriceLevel]) {
    let _ = writeln!(out, "{label} ({}):", levels.len());
    for level in levels {
        let _ = writeln!(out, "  {:>14} @ {}", level.size, level.price);
    }
}

// =============================================================================
// Tests
// =============================================================================
