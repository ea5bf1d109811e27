//! Runtime Configuration Module
//!
//! Loads [`RuntimeConfig`] from TOML with environment overrides and expands
//! shell variables in the middleware address.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of environment overrides, e.g. `MODULE_RUNTIME_SOCKET_ADDRESS`
pub const ENV_PREFIX: &str = "MODULE_RUNTIME";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// `unix:///path`, an absolute path, or `host:port`
    pub socket_address: String,
    pub host_id: String,
    pub user_id: String,
    pub device_id: String,
    pub runtime_name: String,
    pub handshake_timeout_ms: u64,
    pub discovery_timeout_ms: u64,
    pub max_message_size: usize,
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket_address: "unix:///tmp/module-runtime/middleware.sock".to_string(),
            host_id: "localhost".to_string(),
            user_id: "default_user".to_string(),
            device_id: String::new(),
            runtime_name: "RUNTIME_RUST".to_string(),
            handshake_timeout_ms: 10_000,
            discovery_timeout_ms: 10_000,
            max_message_size: 16 * 1024 * 1024, // 16MB
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from an optional file plus process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load with an explicit environment map instead of the process
    /// environment (`None` reads the real environment)
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let mut config: RuntimeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.expand_env_vars()?;
        config.validate()?;
        debug!(?config, "Runtime configuration loaded");
        Ok(config)
    }

    /// Expand `~` and `$VARS` in the middleware address
    pub fn expand_env_vars(&mut self) -> Result<()> {
        let expanded = shellexpand::full(&self.socket_address)
            .context("Failed to expand socket address")?;
        self.socket_address = expanded.to_string();
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.socket_address.trim().is_empty() {
            bail!("socket_address must not be empty");
        }
        if self.runtime_name.trim().is_empty() {
            bail!("runtime_name must not be empty");
        }
        if self.handshake_timeout_ms == 0 {
            bail!("handshake_timeout_ms must be greater than zero");
        }
        if self.discovery_timeout_ms == 0 {
            bail!("discovery_timeout_ms must be greater than zero");
        }
        if self.max_message_size == 0 {
            bail!("max_message_size must be greater than zero");
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}
