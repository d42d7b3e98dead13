//! Server configuration.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! listen = "0.0.0.0:9944"
//! connection_timeout_secs = 60
//! self_tests = true
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` to bind.
    pub listen: String,
    /// How long an idle HTTP/1 connection waits for its next request. `0`
    /// disables it.
    pub connection_timeout_secs: u64,
    /// Mount the `/test/{apiRoot}/…` self-test endpoints.
    pub self_tests: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9944".to_owned(),
            connection_timeout_secs: 60,
            self_tests: true,
        }
    }
}

impl ServerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Listen(self.listen.clone()))
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_secs > 0).then(|| Duration::from_secs(self.connection_timeout_secs))
    }
}
