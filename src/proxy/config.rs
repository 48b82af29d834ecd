//! Front-door listener configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the front-door proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Host the function runtimes publish their ports on.
    pub runtime_host: String,
    /// How long to wait for a function runtime to answer.
    pub invocation_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            runtime_host: "localhost".to_string(),
            invocation_timeout: Duration::from_secs(30),
        }
    }
}

impl ProxyConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the host used to reach function runtimes.
    pub fn runtime_host(mut self, host: impl Into<String>) -> Self {
        self.runtime_host = host.into();
        self
    }

    /// Set the invocation timeout.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
