//! Agent record: the registry's unit of ownership.

use crate::transport::ListenAddress;
use crate::types::{AgentState, Did};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Directory entry for one agent.
///
/// Records are archived on termination, never erased, so a DID keeps
/// resolving for the lifetime of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub did: Did,
    pub name: String,
    /// Free-form classification tag used for routing and authorization.
    pub role: String,
    pub state: AgentState,
    /// Present only while the agent is running.
    pub listen_addr: Option<ListenAddress>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fault cause when `state` is `failed`.
    pub failure: Option<String>,
}

impl AgentRecord {
    pub fn new(did: Did, name: String, role: String) -> Self {
        let now = Utc::now();
        Self {
            did,
            name,
            role,
            state: AgentState::Registered,
            listen_addr: None,
            created_at: now,
            updated_at: now,
            failure: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == AgentState::Running
    }
}
