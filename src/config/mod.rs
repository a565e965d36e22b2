//! Configuration
//!
//! Layered with the `config` crate: built-in defaults, then the global file
//! `$XDG_CONFIG_HOME/maple/config.toml`, then an explicit `--config` file,
//! then `MAPLE_*` environment variables (`__` separates nested keys).

pub mod facade;
pub mod merge {
    pub mod service;
}
pub mod paths {
    pub mod xdg_root;
}
pub mod sections;
pub mod sources {
    pub mod environment;
    pub mod file;
}

pub use facade::ConfigLoader;
pub use sections::{
    ApiConfig, CredentialConfig, RegistryConfig, RouterSettings, StorageConfig,
    SupervisorSettings, TransportConfig,
};

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub api: ApiConfig,
    pub credentials: Vec<CredentialConfig>,
    pub transport: TransportConfig,
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub router: RouterSettings,
    pub supervisor: SupervisorSettings,
    pub logging: LoggingConfig,
}

impl DirectoryConfig {
    /// Config for tests and throwaway nodes: in-memory store, fast retries.
    pub fn ephemeral() -> Self {
        let mut config = Self::default();
        config.storage.in_memory = true;
        config.router.initial_backoff_ms = 10;
        config.router.max_backoff_ms = 100;
        config.supervisor.grace_period_ms = 1000;
        config
    }

    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> Result<(), ApiError> {
        let invalid = |msg: &str| Err(ApiError::ConfigError(msg.to_string()));

        if self.router.max_attempts == 0 {
            return invalid("router.max_attempts must be at least 1");
        }
        if self.router.initial_backoff_ms == 0 {
            return invalid("router.initial_backoff_ms must be positive");
        }
        if self.router.max_backoff_ms < self.router.initial_backoff_ms {
            return invalid("router.max_backoff_ms must not be below router.initial_backoff_ms");
        }
        if self.supervisor.grace_period_ms == 0 || self.supervisor.startup_timeout_ms == 0 {
            return invalid("supervisor timeouts must be positive");
        }
        if self.transport.connect_timeout_ms == 0 || self.transport.io_timeout_ms == 0 {
            return invalid("transport timeouts must be positive");
        }
        if self.transport.max_frame_bytes == 0 {
            return invalid("transport.max_frame_bytes must be positive");
        }
        if self.api.request_timeout_secs == 0 {
            return invalid("api.request_timeout_secs must be positive");
        }
        if self.api.max_connections == 0 || self.api.max_body_bytes == 0 {
            return invalid("api limits must be positive");
        }
        if self.api.bind.parse::<SocketAddr>().is_err() {
            return Err(ApiError::ConfigError(format!(
                "api.bind is not a socket address: {}",
                self.api.bind
            )));
        }
        for (i, credential) in self.credentials.iter().enumerate() {
            if credential.token.trim().is_empty() || credential.caller.trim().is_empty() {
                return Err(ApiError::ConfigError(format!(
                    "credentials[{}] needs a token and a caller",
                    i
                )));
            }
        }
        Ok(())
    }

    /// Where the sled registry lives, or None for an in-memory node.
    pub fn storage_path(&self) -> Result<Option<PathBuf>, ApiError> {
        if self.storage.in_memory {
            return Ok(None);
        }
        match &self.storage.path {
            Some(path) => Ok(Some(path.clone())),
            None => paths::xdg_root::default_storage_path().map(Some),
        }
    }
}
