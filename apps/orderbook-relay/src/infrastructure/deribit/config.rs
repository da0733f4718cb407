//! Deribit adapter configuration.

use std::time::Duration;

use crate::infrastructure::config::{Environment, UpstreamSettings};

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the Deribit JSON-RPC client.
#[derive(Debug, Clone)]
pub struct DeribitConfig {
    /// JSON-RPC endpoint.
    pub base_url: String,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl DeribitConfig {
    /// Create a configuration for an explicit endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Create a configuration for a venue environment.
    #[must_use]
    pub fn for_environment(environment: Environment, upstream: &UpstreamSettings) -> Self {
        Self::new(environment.api_base_url()).with_timeout(upstream.request_timeout)
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
