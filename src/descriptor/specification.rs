//! Validated agent descriptor.

use crate::error::ApiError;
use crate::transport::ListenAddress;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Only descriptor format version understood by this loader.
pub const SUPPORTED_VERSION: u32 = 1;

pub const DEFAULT_MAX_INBOX: usize = 256;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Per-agent resource bounds enforced by its execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Bounded inbox depth; a full inbox answers `busy`.
    pub max_inbox: usize,
    /// Longest accepted wire frame.
    pub max_payload_bytes: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_inbox: DEFAULT_MAX_INBOX,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl ResourceLimits {
    /// Both bounds must be at least one.
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.max_inbox == 0 {
            return Err(ApiError::schema("resources.max_inbox", "must be at least 1"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ApiError::schema(
                "resources.max_payload_bytes",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Where the execution context binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListenSpec {
    /// Use the node's configured transport address.
    #[default]
    Auto,
    Fixed(ListenAddress),
}

/// Immutable agent descriptor produced by `DescriptorLoader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpecification {
    pub version: u32,
    pub name: String,
    pub role: String,
    /// Behavior references resolved against the runtime's catalog.
    pub behaviors: Vec<String>,
    /// Initial configuration handed to each behavior.
    pub config: serde_json::Map<String, Value>,
    pub resources: ResourceLimits,
    pub listen: ListenSpec,
    /// Unrecognized top-level fields, kept verbatim.
    pub extensions: BTreeMap<String, Value>,
}

impl AgentSpecification {
    /// Minimal descriptor with defaults for everything optional.
    pub fn new(name: impl Into<String>, role: impl Into<String>, behaviors: Vec<String>) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            name: name.into(),
            role: role.into(),
            behaviors,
            config: serde_json::Map::new(),
            resources: ResourceLimits::default(),
            listen: ListenSpec::Auto,
            extensions: BTreeMap::new(),
        }
    }

    pub fn with_listen(mut self, listen: ListenSpec) -> Self {
        self.listen = listen;
        self
    }

    pub fn with_resources(mut self, resources: ResourceLimits) -> Self {
        self.resources = resources;
        self
    }
}
