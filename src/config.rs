use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use config::Config;
use serde::Deserialize;
use tracing::info;

use crate::utils::error::RelayError;

/// Response templates sent to clients, overridable from configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Messages {
    /// Sent when the supplied token does not match the shared secret.
    #[serde(default = "default_invalid_token")]
    pub invalid_token: String,
    /// Sent when the executor reports a successfully executed command.
    #[serde(default = "default_command_executed")]
    pub command_executed: String,
    /// Logged once when the relay comes up.
    #[serde(default = "default_activated")]
    pub activated: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            invalid_token: default_invalid_token(),
            command_executed: default_command_executed(),
            activated: default_activated(),
        }
    }
}

/// Configuration snapshot for the command relay.
///
/// A snapshot is immutable once built; a reload produces a fresh value
/// and swaps it in wholesale.
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// The TCP port on which the relay listens.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret compared (trimmed) against the client token.
    #[serde(default = "default_secret_key")]
    pub secret_key: String,
    /// Peer IPs allowed to connect; an empty set allows any IP.
    #[serde(default)]
    pub allowed_ips: HashSet<String>,
    /// Command roots (first whitespace-delimited word) that may be relayed.
    #[serde(default)]
    pub allowed_commands: HashSet<String>,
    /// When true, every received raw line is logged.
    #[serde(default)]
    pub debug: bool,
    /// Client-visible response templates.
    #[serde(default)]
    pub messages: Messages,
    /// The maximum number of simultaneously served connections.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Upper bound, in seconds, on one wait for an executor result.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,
    /// The maximum number of admitted connections per second and peer IP.
    #[serde(default = "default_connection_rate_limit")]
    pub connection_rate_limit: u32,
    /// Whether the HTTP metrics endpoint is served.
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,
    /// The port for the HTTP metrics endpoint.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_port() -> u16 {
    8193
}

fn default_secret_key() -> String {
    "mi_token_secreto".to_string()
}

fn default_max_clients() -> usize {
    20
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_connection_rate_limit() -> u32 {
    20
}

fn default_enable_metrics() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9080
}

fn default_invalid_token() -> String {
    "ERROR: invalid token".to_string()
}

fn default_command_executed() -> String {
    "Command executed successfully".to_string()
}

fn default_activated() -> String {
    "Command relay activated".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            secret_key: default_secret_key(),
            allowed_ips: HashSet::new(),
            allowed_commands: HashSet::new(),
            debug: false,
            messages: Messages::default(),
            max_clients: default_max_clients(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            connection_rate_limit: default_connection_rate_limit(),
            enable_metrics: default_enable_metrics(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl RelayConfig {
    /// Validates the configuration settings.
    ///
    /// # Errors
    /// Returns a `RelayError::Configuration` if a limit is zero.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.max_clients == 0 {
            return Err(RelayError::Configuration(
                "max_clients must be greater than 0".into(),
            ));
        }

        if self.connection_rate_limit == 0 {
            return Err(RelayError::Configuration(
                "connection_rate_limit must be greater than 0".into(),
            ));
        }

        if self.dispatch_timeout_secs == 0 {
            return Err(RelayError::Configuration(
                "dispatch_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Holds the active configuration snapshot and supports atomic reload.
///
/// Readers take the current `Arc` and keep using it for as long as they
/// like; a reload builds a complete new snapshot and swaps the pointer,
/// so no reader ever observes a half-updated configuration.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<RelayConfig>>,
}

impl ConfigStore {
    /// Loads configuration from the file at `path` (missing file means
    /// all defaults), layered under `RELAY_`-prefixed environment
    /// variables.
    ///
    /// # Errors
    /// Returns `RelayError::Configuration` if the sources cannot be
    /// parsed or the result fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let config = Self::read(Some(path.as_ref()))?;
        Ok(Self {
            path: Some(path.as_ref().to_path_buf()),
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Wraps an already-built snapshot, with no backing file.
    pub fn from_snapshot(config: RelayConfig) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Returns the current snapshot. Cheap and safe to call from any task.
    pub fn current(&self) -> Arc<RelayConfig> {
        self.current.read().unwrap().clone()
    }

    /// Re-reads the configuration sources and atomically swaps the
    /// current snapshot.
    ///
    /// In-flight sessions keep the snapshot they already fetched; a
    /// parse or validation failure leaves the previous snapshot current.
    ///
    /// # Errors
    /// Returns `RelayError::Configuration` if the store has no backing
    /// file or the fresh snapshot cannot be built.
    pub fn reload(&self) -> Result<(), RelayError> {
        let path = self.path.as_deref().ok_or_else(|| {
            RelayError::Configuration("no configuration file to reload from".into())
        })?;
        let fresh = Self::read(Some(path))?;
        *self.current.write().unwrap() = Arc::new(fresh);
        info!("Config reloaded");
        Ok(())
    }

    fn read(path: Option<&Path>) -> Result<RelayConfig, RelayError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        let config: RelayConfig = builder
            .add_source(config::Environment::with_prefix("RELAY"))
            .build()
            .map_err(|e| RelayError::Configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| RelayError::Configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }
}
