//! Runtime Configuration Module
//!
//! Loads a [`RuntimeConfig`] from a TOML file layered with environment
//! overrides. Every field has a default so an empty file is a valid
//! single-process configuration.

use crate::defaults;
use anyhow::{bail, ensure, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use types::ActorId;

/// Main runtime configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workers: usize,
    pub log_level: String,

    /// Listener for peer runtimes, `host:port`
    pub service_listen: Option<String>,

    /// Listener for admin tools, `host:port`
    pub admin_listen: Option<String>,

    pub custom_listeners: Vec<CustomListenerConfig>,
    pub remote_actors: Vec<RemoteActorConfig>,
    pub proxy: ProxyConfig,
    pub shutdown: ShutdownConfig,
}

/// How a custom listener picks the actor that receives a new connection
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    #[default]
    RoundRobin,
    Random,
    /// Stable per peer IP address
    SourceHash,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CustomListenerConfig {
    pub description: String,
    pub address: String,
    pub handlers: Vec<ActorId>,
    #[serde(default)]
    pub distribution: Distribution,
}

/// An actor hosted by another process
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RemoteActorConfig {
    pub id: ActorId,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Shared secret for session handshakes
    pub secret: String,
    pub max_sessions: usize,
    pub connect_timeout_ms: u64,
    pub reconnect_interval_ms: u64,
    pub open_heartbeat: bool,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub pending_limit: usize,
    pub pending_total_limit: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    pub destroy_timeout_ms: u64,
    pub listener_close_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: defaults::dispatcher::WORKERS,
            log_level: defaults::dispatcher::LOG_LEVEL.to_string(),
            service_listen: None,
            admin_listen: None,
            custom_listeners: Vec::new(),
            remote_actors: Vec::new(),
            proxy: ProxyConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            max_sessions: defaults::proxy::MAX_SESSIONS,
            connect_timeout_ms: defaults::proxy::CONNECT_TIMEOUT_MS,
            reconnect_interval_ms: defaults::proxy::RECONNECT_INTERVAL_MS,
            open_heartbeat: defaults::proxy::OPEN_HEARTBEAT,
            heartbeat_interval_ms: defaults::proxy::HEARTBEAT_INTERVAL_MS,
            heartbeat_timeout_ms: defaults::proxy::HEARTBEAT_TIMEOUT_MS,
            pending_limit: defaults::proxy::PENDING_LIMIT,
            pending_total_limit: defaults::proxy::PENDING_TOTAL_LIMIT,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            destroy_timeout_ms: defaults::shutdown::DESTROY_TIMEOUT_MS,
            listener_close_timeout_ms: defaults::shutdown::LISTENER_CLOSE_TIMEOUT_MS,
        }
    }
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

impl ShutdownConfig {
    pub fn destroy_timeout(&self) -> Duration {
        Duration::from_millis(self.destroy_timeout_ms)
    }

    pub fn listener_close_timeout(&self) -> Duration {
        Duration::from_millis(self.listener_close_timeout_ms)
    }
}

impl RuntimeConfig {
    /// Load from a TOML file with `SKEIN__` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading runtime config: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(defaults::ENV_PREFIX)
                    .separator(defaults::ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let parsed: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        debug!(
            workers = parsed.workers,
            remote_actors = parsed.remote_actors.len(),
            "Runtime config loaded"
        );
        Ok(parsed)
    }

    /// Parse in-memory TOML, no environment layer
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    fn has_network_surface(&self) -> bool {
        self.service_listen.is_some()
            || self.admin_listen.is_some()
            || !self.remote_actors.is_empty()
    }

    /// Reject settings the runtime cannot start with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers > 0, "workers must be at least 1");

        if self.has_network_surface() && self.proxy.secret.is_empty() {
            bail!("proxy.secret is required when listeners or remote actors are configured");
        }

        if self.proxy.open_heartbeat {
            ensure!(
                self.proxy.heartbeat_interval_ms > 0,
                "proxy.heartbeat_interval_ms must be positive"
            );
            ensure!(
                self.proxy.heartbeat_timeout_ms > self.proxy.heartbeat_interval_ms,
                "proxy.heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.proxy.heartbeat_timeout_ms,
                self.proxy.heartbeat_interval_ms
            );
        }

        ensure!(self.proxy.max_sessions > 0, "proxy.max_sessions must be positive");
        ensure!(
            self.proxy.pending_total_limit >= self.proxy.pending_limit,
            "proxy.pending_total_limit ({}) must be at least pending_limit ({})",
            self.proxy.pending_total_limit,
            self.proxy.pending_limit
        );

        for listener in &self.custom_listeners {
            ensure!(
                !listener.handlers.is_empty(),
                "custom listener '{}' has no handler actors",
                listener.description
            );
        }

        for remote in &self.remote_actors {
            ensure!(
                !remote.id.is_proxy(),
                "remote actor id 0 is reserved for the proxy"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"
workers = 2
service_listen = "127.0.0.1:7100"

[proxy]
secret = "s3cret"
reconnect_interval_ms = 500

[[remote_actors]]
id = 20
host = "10.0.0.2"
port = 7100

[[custom_listeners]]
description = "gateway"
address = "0.0.0.0:9000"
handlers = [3, 4]
distribution = "source_hash"
"#;

    #[test]
    fn test_defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.proxy.pending_limit, 10_000);
        assert_eq!(config.proxy.pending_total_limit, 100_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.proxy.reconnect_interval(), Duration::from_millis(500));
        assert_eq!(config.proxy.max_sessions, defaults::proxy::MAX_SESSIONS);
        assert_eq!(config.remote_actors[0].id, ActorId::new(20));
        assert_eq!(config.custom_listeners[0].distribution, Distribution::SourceHash);
        assert_eq!(config.custom_listeners[0].handlers, vec![ActorId::new(3), ActorId::new(4)]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RuntimeConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(RuntimeConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = RuntimeConfig::from_toml_str(SAMPLE).unwrap();
        config.proxy.secret.clear();
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());

        let mut config = RuntimeConfig::default();
        config.proxy.heartbeat_timeout_ms = config.proxy.heartbeat_interval_ms;
        assert!(config.validate().is_err());
        config.proxy.open_heartbeat = false;
        assert!(config.validate().is_ok());

        let mut config = RuntimeConfig::from_toml_str(SAMPLE).unwrap();
        config.custom_listeners[0].handlers.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gateway"));

        let mut config = RuntimeConfig::default();
        config.proxy.pending_total_limit = config.proxy.pending_limit - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file_with_env_override() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("node.toml");
        fs::write(&path, SAMPLE).unwrap();

        std::env::set_var("SKEIN__SHUTDOWN__DESTROY_TIMEOUT_MS", "1234");
        let config = RuntimeConfig::load(&path);
        std::env::remove_var("SKEIN__SHUTDOWN__DESTROY_TIMEOUT_MS");
        let config = config.unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.proxy.secret, "s3cret");
        assert_eq!(config.shutdown.destroy_timeout(), Duration::from_millis(1234));
        assert_eq!(config.remote_actors.len(), 1);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempdir().unwrap();
        assert!(RuntimeConfig::load(dir.path().join("absent.toml")).is_err());
    }
}
