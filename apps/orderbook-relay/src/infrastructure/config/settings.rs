//! Relay Configuration Settings
//!
//! Configuration types for the relay server and client, loaded from
//! environment variables.

use std::time::Duration;

/// Deribit venue environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Deribit testnet (`test.deribit.com`).
    #[default]
    Test,
    /// Deribit production (`www.deribit.com`).
    Live,
}

impl Environment {
    /// Parse environment from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "live" | "prod" | "production" => Self::Live,
            _ => Self::Test,
        }
    }

    /// Check if this is the live environment.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Get the environment name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }

    /// JSON-RPC base URL for this environment.
    #[must_use]
    pub const fn api_base_url(&self) -> &'static str {
        match self {
            Self::Test => "https://test.deribit.com/api/v2",
            Self::Live => "https://www.deribit.com/api/v2",
        }
    }
}

/// Deribit API credentials.
#[derive(Clone)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
        }
    }

    /// Get the client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Get the client secret.
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &"[REDACTED]")
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// WebSocket relay port.
    pub relay_port: u16,
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            relay_port: 9002,
            health_port: 8082,
        }
    }
}

/// Update pump and connection settings.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Delay between snapshot polls for one subscription.
    pub poll_interval: Duration,
    /// Capacity of each connection's outbound frame queue.
    pub outbound_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            outbound_capacity: 256,
        }
    }
}

/// Upstream HTTP settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Complete relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Venue environment.
    pub environment: Environment,
    /// API credentials.
    pub credentials: Credentials,
    /// Server port settings.
    pub server: ServerSettings,
    /// Pump and connection settings.
    pub relay: RelaySettings,
    /// Upstream HTTP settings.
    pub upstream: UpstreamSettings,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `DERIBIT_CLIENT_ID` or `DERIBIT_CLIENT_SECRET`
    /// is missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let client_id = required_var(&lookup, "DERIBIT_CLIENT_ID")?;
        let client_secret = required_var(&lookup, "DERIBIT_CLIENT_SECRET")?;

        let environment = lookup("DERIBIT_ENV")
            .map(|s| Environment::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let server = ServerSettings {
            relay_port: parse_var(&lookup, "RELAY_PORT")
                .unwrap_or(ServerSettings::default().relay_port),
            health_port: parse_var(&lookup, "RELAY_HEALTH_PORT")
                .unwrap_or(ServerSettings::default().health_port),
        };

        let relay = RelaySettings {
            poll_interval: parse_var(&lookup, "RELAY_POLL_INTERVAL_MS")
                .map_or(RelaySettings::default().poll_interval, Duration::from_millis),
            outbound_capacity: parse_var(&lookup, "RELAY_OUTBOUND_CAPACITY")
                .unwrap_or(RelaySettings::default().outbound_capacity)
                .max(1),
        };

        let upstream = UpstreamSettings {
            request_timeout: parse_var(&lookup, "DERIBIT_TIMEOUT_SECS")
                .map_or(UpstreamSettings::default().request_timeout, Duration::from_secs),
        };

        Ok(Self {
            environment,
            credentials: Credentials::new(client_id, client_secret),
            server,
            relay,
            upstream,
        })
    }
}

/// Relay client settings.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Relay WebSocket URL.
    pub url: String,
    /// Upper bound on the connect handshake.
    pub connect_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:9002".to_string(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientSettings {
    /// Create client settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create client settings from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            url: lookup("RELAY_URL").unwrap_or(defaults.url),
            connect_timeout: parse_var(&lookup, "RELAY_CONNECT_TIMEOUT_SECS")
                .map_or(defaults.connect_timeout, Duration::from_secs),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn required_var(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<String, ConfigError> {
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

/// Unparseable values fall back to the caller's default.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use test_case::test_case;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const CREDENTIALS: [(&str, &str); 2] = [
        ("DERIBIT_CLIENT_ID", "id123"),
        ("DERIBIT_CLIENT_SECRET", "secret456"),
    ];

    #[test_case(&[("DERIBIT_CLIENT_SECRET", "s")], "DERIBIT_CLIENT_ID" ; "missing client id")]
    #[test_case(&[("DERIBIT_CLIENT_ID", "i")], "DERIBIT_CLIENT_SECRET" ; "missing client secret")]
    #[test_case(&[], "DERIBIT_CLIENT_ID" ; "nothing set")]
    fn missing_credentials_are_reported(pairs: &[(&str, &str)], expected: &str) {
        let err = RelayConfig::from_lookup(vars(pairs)).unwrap_err();
        assert!(
            matches!(&err, ConfigError::MissingEnvVar(key) if key == expected),
            "{err:?}"
        );
        assert!(err.to_string().contains(expected));
    }

    #[test]
    fn empty_secret_is_rejected() {
        let lookup = vars(&[("DERIBIT_CLIENT_ID", "i"), ("DERIBIT_CLIENT_SECRET", "")]);
        let err = RelayConfig::from_lookup(lookup).unwrap_err();
        assert!(matches!(&err, ConfigError::EmptyValue(key) if key == "DERIBIT_CLIENT_SECRET"));
    }

    #[test]
    fn credentials_alone_yield_defaults() {
        let config = RelayConfig::from_lookup(vars(&CREDENTIALS)).unwrap();
        assert_eq!(config.environment, Environment::Test);
        assert_eq!(config.server.relay_port, 9002);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.relay.poll_interval, Duration::from_secs(1));
        assert_eq!(config.relay.outbound_capacity, 256);
        assert_eq!(config.credentials.client_id(), "id123");
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = CREDENTIALS.to_vec();
        pairs.extend([
            ("DERIBIT_ENV", "live"),
            ("RELAY_PORT", "9100"),
            ("RELAY_POLL_INTERVAL_MS", "250"),
            ("RELAY_OUTBOUND_CAPACITY", "0"),
            ("RELAY_HEALTH_PORT", "not-a-port"),
        ]);
        let config = RelayConfig::from_lookup(vars(&pairs)).unwrap();
        assert!(config.environment.is_live());
        assert_eq!(config.server.relay_port, 9100);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.relay.poll_interval, Duration::from_millis(250));
        assert_eq!(config.relay.outbound_capacity, 1);
    }

    #[test]
    fn client_settings_read_url_override() {
        let settings = ClientSettings::from_lookup(vars(&[("RELAY_URL", "ws://relay:9002")]));
        assert_eq!(settings.url, "ws://relay:9002");
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }

    #[test_case("live", Environment::Live)]
    #[test_case("LIVE", Environment::Live)]
    #[test_case("prod", Environment::Live)]
    #[test_case("test", Environment::Test)]
    #[test_case("TEST", Environment::Test)]
    #[test_case("unknown", Environment::Test)]
    fn environment_parsing(input: &str, expected: Environment) {
        assert_eq!(Environment::from_str_case_insensitive(input), expected);
    }

    #[test]
    fn environment_urls() {
        assert!(Environment::Test.api_base_url().contains("test.deribit.com"));
        assert!(Environment::Live.api_base_url().contains("www.deribit.com"));
        assert!(Environment::Live.is_live());
        assert!(!Environment::Test.is_live());
    }

    #[test]
    fn credentials_redacted_debug() {
        let creds = Credentials::new("id123".to_string(), "secret456".to_string());
        let debug = format!("{creds:?}");
        assert!(!debug.contains("id123"));
        assert!(!debug.contains("secret456"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.relay_port, 9002);
        assert_eq!(settings.health_port, 8082);
    }

    #[test]
    fn relay_settings_defaults() {
        let settings = RelaySettings::default();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.outbound_capacity, 256);
    }

    #[test]
    fn client_settings_defaults() {
        let settings = ClientSettings::default();
        assert_eq!(settings.url, "ws://127.0.0.1:9002");
        assert_eq!(settings.connect_timeout, Duration::from_secs(5));
    }
}
