//! Client configuration
//!
//! Loaded from TOML, optionally overridden from `SPIRON_*` environment
//! variables, then validated before a client is built. By default a client
//! runs four workers with a two second per-attempt timeout and three retry
//! rounds.

use crate::error::ConfigError;
use crate::transport::PeerAddress;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SPIRON_";

/// What `dispatch_async` does when the worker queue is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaturationPolicy {
    /// Block the submitting thread until a slot frees up
    #[default]
    Block,
    /// Return [`DispatchError::Saturated`](crate::DispatchError::Saturated) immediately
    FailFast,
}

/// Delay inserted between retry rounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the second round
    pub initial_ms: u64,
    /// Upper bound on any delay
    pub max_ms: u64,
    /// Growth factor per round
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: 10,
            max_ms: 500,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry round `retry` (0 = the first repeated round)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let millis = self.initial_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Options handed to the [`PeerConnector`](crate::PeerConnector) for every peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Largest message accepted in either direction
    pub max_message_bytes: usize,
    /// Interval between keepalive pings
    pub keepalive_ms: u64,
    /// How long to wait for a keepalive acknowledgement
    pub keepalive_timeout_ms: u64,
    /// Budget for establishing the initial connection
    pub connect_timeout_ms: u64,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_message_bytes: 100 * 1024 * 1024,
            keepalive_ms: 30_000,
            keepalive_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Construction parameters for [`SpironClient`](crate::SpironClient)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Ordered peer list; order is the attempt order within a round
    pub peers: Vec<PeerAddress>,
    /// Size of the worker pool backing the async API
    pub worker_threads: usize,
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of rounds over the peer list
    pub max_retries: u32,
    /// Tasks that may wait in the worker queue
    pub queue_capacity: usize,
    /// Behaviour when the worker queue is full
    pub saturation: SaturationPolicy,
    /// Optional delay between rounds
    pub backoff: Option<BackoffConfig>,
    /// Options passed to the connector
    pub transport: TransportOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            worker_threads: 4,
            timeout_ms: 2_000,
            max_retries: 3,
            queue_capacity: 1_024,
            saturation: SaturationPolicy::default(),
            backoff: None,
            transport: TransportOptions::default(),
        }
    }
}

impl ClientConfig {
    /// Default configuration for the given peers
    pub fn with_peers(peers: Vec<PeerAddress>) -> Self {
        Self {
            peers,
            ..Self::default()
        }
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Per-attempt timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Apply `SPIRON_*` overrides from the process environment
    pub fn merge_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply `SPIRON_*` overrides from explicit key/value pairs
    ///
    /// Unknown keys and keys without the prefix are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "PEERS" => {
                    self.peers = value
                        .split(',')
                        .map(str::trim)
                        .filter(|peer| !peer.is_empty())
                        .map(str::parse::<PeerAddress>)
                        .collect::<Result<Vec<_>, _>>()?;
                }
                "WORKER_THREADS" => self.worker_threads = parse_number("worker_threads", value)?,
                "TIMEOUT_MS" => self.timeout_ms = parse_number("timeout_ms", value)?,
                "MAX_RETRIES" => self.max_retries = parse_number("max_retries", value)?,
                "QUEUE_CAPACITY" => self.queue_capacity = parse_number("queue_capacity", value)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// Check that the configuration can back a client
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peers.is_empty() {
            return Err(ConfigError::invalid("peers", "at least one peer is required"));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::invalid("worker_threads", "must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("timeout_ms", "must be positive"));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::invalid("queue_capacity", "must be positive"));
        }
        if let Some(backoff) = &self.backoff {
            if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
                return Err(ConfigError::invalid(
                    "backoff.multiplier",
                    format!("must be a finite number >= 1.0, got {}", backoff.multiplier),
                ));
            }
        }
        Ok(())
    }
}

fn parse_number<T>(field: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ConfigError::invalid(field, format!("'{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.timeout(), Duration::from_secs(2));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.saturation, SaturationPolicy::Block);
        assert!(config.backoff.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            peers = ["localhost:8081", "localhost:8082"]
            worker_threads = 8
            timeout_ms = 500
            saturation = "fail-fast"

            [backoff]
            initial_ms = 5
            max_ms = 50
            multiplier = 3.0

            [transport]
            keepalive_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.peers.len(), 2);
        assert_eq!(config.peers[1].port(), 8082);
        assert_eq!(config.worker_threads, 8);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.saturation, SaturationPolicy::FailFast);
        assert_eq!(config.backoff.as_ref().map(|b| b.max_ms), Some(50));
        assert_eq!(config.transport.keepalive_ms, 1000);
        assert_eq!(config.transport.keepalive_timeout_ms, 10_000);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_rejects_bad_peer() {
        let err = ClientConfig::from_toml_str(r#"peers = ["no-port"]"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let mut config = ClientConfig::default();
        config
            .apply_overrides([
                ("SPIRON_PEERS", "a:1, b:2"),
                ("SPIRON_WORKER_THREADS", "2"),
                ("SPIRON_MAX_RETRIES", "5"),
                ("HOME", "/root"),
                ("SPIRON_UNKNOWN", "x"),
            ])
            .unwrap();
        assert_eq!(
            config.peers,
            vec![PeerAddress::new("a", 1).unwrap(), PeerAddress::new("b", 2).unwrap()]
        );
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.max_retries, 5);

        let err = config
            .apply_overrides([("SPIRON_TIMEOUT_MS", "soon")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "timeout_ms", .. }));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            ClientConfig::default().validate(),
            Err(ConfigError::Invalid { field: "peers", .. })
        ));

        let peers = vec!["localhost:8081".parse().unwrap()];
        let mut config = ClientConfig::with_peers(peers);
        config.validate().unwrap();

        config.max_retries = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "max_retries", .. })
        ));
    }

    #[test]
    fn test_backoff_is_capped() {
        let backoff = BackoffConfig::default();
        assert_eq!(backoff.delay_for(0), Duration::from_millis(10));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(20));
        assert_eq!(backoff.delay_for(10), Duration::from_millis(500));
    }
}
