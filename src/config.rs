//! Framework Configuration
//!
//! Serde/TOML configuration for the pieces of the framework that carry
//! tunables: which host and ports to listen on, how long shutdown may take,
//! and the bounded wait budget for key-exchange completion.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secure::ExchangeWait;
use crate::{Error, Result};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub key_exchange: KeyExchangeConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address acceptors bind to
    pub bind_host: IpAddr,
    /// Ports to listen on at process start
    pub ports: Vec<u16>,
    /// Upper bound on waiting for acceptors and connections to wind down
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Key-exchange wait budget
///
/// Callers of `encrypt`/`decrypt` that arrive before the exchange has
/// finished wait on the completion signal in `poll_interval` slices, at most
/// `max_attempts` times, before giving up with `KeyExchangeIncomplete`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeyExchangeConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            key_exchange: KeyExchangeConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([127, 0, 0, 1]),
            ports: Vec::new(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for KeyExchangeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 3,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for port in &self.server.ports {
            if !seen.insert(*port) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate port {} in server.ports",
                    port
                )));
            }
        }
        if self.key_exchange.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "key_exchange.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl From<&KeyExchangeConfig> for ExchangeWait {
    fn from(config: &KeyExchangeConfig) -> Self {
        ExchangeWait::new(config.poll_interval, config.max_attempts)
    }
}
