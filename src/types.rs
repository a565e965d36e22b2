//! Core types shared by every component of the directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DID method prefix for agents minted by this service.
pub const DID_PREFIX: &str = "did:maple:agent:";

/// Decentralized identifier bound to exactly one agent record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    /// Mint a fresh identifier. Collisions are as likely as a v4 UUID collision.
    pub fn generate() -> Self {
        Did(format!("{}{}", DID_PREFIX, uuid::Uuid::new_v4().simple()))
    }

    /// Parse a DID string. Any `did:<method>:<id>` is accepted so lookups of
    /// foreign identifiers fail as unknown rather than malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let scheme = parts.next()?;
        let method = parts.next()?;
        let id = parts.next()?;
        if scheme != "did" || method.is_empty() || id.is_empty() {
            return None;
        }
        if value.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Did(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Registered,
    Starting,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl AgentState {
    /// Terminal states are archived and never left.
    pub fn is_terminal(self) -> bool {
        matches!(self, AgentState::Terminated | AgentState::Failed)
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        match (self, next) {
            (Registered, Starting) => true,
            (Starting, Running) => true,
            (Running, Stopping) => true,
            (Stopping, Terminated) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Registered => "registered",
            AgentState::Starting => "starting",
            AgentState::Running => "running",
            AgentState::Stopping => "stopping",
            AgentState::Terminated => "terminated",
            AgentState::Failed => "failed",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(AgentState::Registered),
            "starting" => Ok(AgentState::Starting),
            "running" => Ok(AgentState::Running),
            "stopping" => Ok(AgentState::Stopping),
            "terminated" => Ok(AgentState::Terminated),
            "failed" => Ok(AgentState::Failed),
            other => Err(format!("unknown agent state: {}", other)),
        }
    }
}
