//! Identity Registry
//!
//! Issues decentralized identifiers for agents, persists their records, and
//! owns the agent lifecycle state machine. Records are archived, not deleted,
//! so DID resolution stays valid after an agent terminates.

pub mod record;
pub mod registry;
pub mod repository;

pub use record::AgentRecord;
pub use registry::IdentityRegistry;
pub use repository::{IdentityRepository, InMemoryIdentityRepository, SledIdentityRepository};

use serde::{Deserialize, Serialize};

/// Name uniqueness policy applied by `IdentityRegistry::issue`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameUniqueness {
    /// Every registration gets a fresh DID, names may repeat.
    #[default]
    None,
    /// A live (non-terminal) agent's name is unique within its role.
    PerRole,
}
