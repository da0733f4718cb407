//! Configuration Module
//!
//! Configuration loading for the relay server and client.

mod settings;

pub use settings::{
    ClientSettings, ConfigError, Credentials, Environment, RelayConfig, RelaySettings,
    ServerSettings, UpstreamSettings,
};
