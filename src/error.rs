//! Error types for the directory core.
//!
//! `ApiError` is the taxonomy every component returns to its caller.
//! `StorageError` covers the persistence layer underneath the registry.

use crate::types::{AgentState, Did};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by the registry persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("corrupt record for {key}: {detail}")]
    Corrupt { key: String, detail: String },
}

/// Why a recipient could not be handed a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Unavailability {
    /// No record was ever issued for the DID.
    Unknown,
    /// The agent ran and was shut down.
    Terminated,
    /// The agent faulted.
    Failed,
    /// The agent exists but is not accepting messages.
    NotRunning { state: AgentState },
}

impl fmt::Display for Unavailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailability::Unknown => write!(f, "unknown identity"),
            Unavailability::Terminated => write!(f, "agent terminated"),
            Unavailability::Failed => write!(f, "agent failed"),
            Unavailability::NotRunning { state } => write!(f, "agent is {}", state),
        }
    }
}

/// Why the router gave up on a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Exhaustion {
    /// Every attempt allowed by the retry policy failed.
    RetriesExhausted { last_error: String },
    /// The caller-supplied deadline passed first.
    Deadline,
    /// The recipient's transport refused the message outright.
    Rejected { detail: String },
}

impl fmt::Display for Exhaustion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exhaustion::RetriesExhausted { last_error } => {
                write!(f, "retries exhausted (last error: {})", last_error)
            }
            Exhaustion::Deadline => write!(f, "deadline exceeded"),
            Exhaustion::Rejected { detail } => write!(f, "rejected by recipient: {}", detail),
        }
    }
}

/// Core error taxonomy.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("agent name '{name}' already in use for role '{role}' by {existing}")]
    DuplicateNameConflict {
        name: String,
        role: String,
        existing: Did,
    },

    #[error("invalid transition for {did}: {from} -> {to}")]
    InvalidTransition {
        did: Did,
        from: AgentState,
        to: AgentState,
    },

    #[error("unknown identity: {0}")]
    UnknownIdentity(Did),

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("schema violation in field '{field}': {detail}")]
    SchemaViolation { field: String, detail: String },

    #[error("spawn failed for {did}: {cause}")]
    SpawnFailed { did: Did, cause: String },

    #[error("agent {0} is already running")]
    AlreadyRunning(Did),

    #[error("recipient {did} unavailable: {reason}")]
    RecipientUnavailable { did: Did, reason: Unavailability },

    #[error("delivery to {did} exhausted after {attempts} attempt(s): {reason}")]
    DeliveryExhausted {
        did: Did,
        attempts: u32,
        reason: Exhaustion,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl ApiError {
    pub fn schema(field: impl Into<String>, detail: impl Into<String>) -> Self {
        ApiError::SchemaViolation {
            field: field.into(),
            detail: detail.into(),
        }
    }

    /// Stable snake_case discriminator callers can branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::DuplicateNameConflict { .. } => "duplicate_name_conflict",
            ApiError::InvalidTransition { .. } => "invalid_transition",
            ApiError::UnknownIdentity(_) => "unknown_identity",
            ApiError::MalformedDescriptor(_) => "malformed_descriptor",
            ApiError::SchemaViolation { .. } => "schema_violation",
            ApiError::SpawnFailed { .. } => "spawn_failed",
            ApiError::AlreadyRunning(_) => "already_running",
            ApiError::RecipientUnavailable { .. } => "recipient_unavailable",
            ApiError::DeliveryExhausted { .. } => "delivery_exhausted",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::StorageError(_) => "storage_error",
            ApiError::ConfigError(_) => "config_error",
        }
    }
}

impl From<sled::Error> for ApiError {
    fn from(err: sled::Error) -> Self {
        ApiError::StorageError(StorageError::Database(err))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
