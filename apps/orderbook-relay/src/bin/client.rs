//! Orderbook Relay Client
//!
//! Connects to a relay, subscribes to the given instruments and prints every
//! snapshot it receives.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin orderbook-client -- BTC-PERPETUAL ETH-PERPETUAL
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_URL`: Relay WebSocket URL (default: <ws://127.0.0.1:9002>)
//! - `RELAY_CONNECT_TIMEOUT_SECS`: Handshake timeout (default: 5)
//! - `RUST_LOG`: Log level (default: info)

use orderbook_relay::{
    ClientEvent, ClientSettings, RelayClient, TelemetryConfig, render_snapshot,
};
use orderbook_relay::infrastructure::telemetry;
use tokio::sync::mpsc;

/// Instrument used when none is given on the command line.
const DEFAULT_SYMBOL: &str = "BTC-PERPETUAL";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let _ = dotenvy::dotenv();
    let _telemetry_guard = telemetry::init_with_config(TelemetryConfig::local());

    let mut symbols: Vec<String> = std::env::args().skip(1).collect();
    if symbols.is_empty() {
        symbols.push(DEFAULT_SYMBOL.to_string());
    }

    let settings = ClientSettings::from_env();
    tracing::info!(url = %settings.url, ?symbols, "Connecting to relay");

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let client = RelayClient::new(settings, event_tx);

    client.connect().await?;
    for symbol in &symbols {
        client.subscribe(symbol).await?;
    }

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                tracing::info!("Received Ctrl+C, unsubscribing");
                break;
            }
            event = event_rx.recv() => match event {
                Some(ClientEvent::Snapshot(snapshot)) => {
                    println!("{}", render_snapshot(&snapshot));
                }
                Some(ClientEvent::Connected) => {
                    tracing::info!("Connected");
                }
                Some(ClientEvent::Error(message)) => {
                    tracing::warn!(error = %message, "Relay session error");
                }
                Some(ClientEvent::Disconnected) | None => {
                    tracing::info!("Relay closed the session");
                    return Ok(());
                }
            }
        }
    }

    for symbol in &symbols {
        if let Err(e) = client.unsubscribe(symbol).await {
            tracing::warn!(%symbol, error = %e, "Unsubscribe failed");
        }
    }
    client.close().await;

    Ok(())
}
