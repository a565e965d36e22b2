//! Configuration sections.

use crate::gateway::Scope;
use crate::identity::NameUniqueness;
use crate::router::RouterConfig;
use crate::runtime::SupervisorConfig;
use crate::transport::tcp::DEFAULT_MAX_FRAME_BYTES;
use crate::transport::ListenAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Public URL clients use to reach the gateway.
    pub base_url: String,
    /// Socket address the gateway binds.
    pub bind: String,
    /// Operator key; granted every scope.
    pub access_key: Option<String>,
    pub request_timeout_secs: u64,
    pub max_connections: usize,
    pub max_body_bytes: usize,
    /// Roles only callers holding `roles:restricted` may register or spawn.
    pub restricted_roles: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            bind: "127.0.0.1:8080".to_string(),
            access_key: None,
            request_timeout_secs: 30,
            max_connections: 256,
            max_body_bytes: 1024 * 1024,
            restricted_roles: vec!["premium".to_string()],
        }
    }
}

/// A bearer credential accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub token: String,
    /// Caller identity recorded as the sender of messages it submits.
    pub caller: String,
    #[serde(default)]
    pub scopes: Vec<Scope>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Agent transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Bind address for agents whose descriptor says `listen: auto`.
    pub listen_addr: ListenAddress,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_addr: ListenAddress::new(
                crate::transport::Host::Ip4(std::net::Ipv4Addr::LOCALHOST),
                0,
            ),
            connect_timeout_ms: 2000,
            io_timeout_ms: 5000,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Registry persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sled directory; None means `$XDG_DATA_HOME/maple/registry`.
    pub path: Option<PathBuf>,
    /// Keep records in memory only.
    pub in_memory: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub name_uniqueness: NameUniqueness,
}

/// Router retry policy, in config units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

impl RouterSettings {
    pub fn policy(&self) -> RouterConfig {
        RouterConfig {
            max_attempts: self.max_attempts,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorSettings {
    pub grace_period_ms: u64,
    pub startup_timeout_ms: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 5000,
            startup_timeout_ms: 5000,
        }
    }
}

impl SupervisorSettings {
    pub fn supervisor_config(&self, default_listen: ListenAddress) -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_millis(self.grace_period_ms),
            startup_timeout: Duration::from_millis(self.startup_timeout_ms),
            default_listen,
        }
    }
}
