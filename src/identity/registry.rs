//! Identity registry: DID issuance, resolution, and the lifecycle state machine.

use crate::error::ApiError;
use crate::identity::repository::{IdentityRepository, InMemoryIdentityRepository};
use crate::identity::{AgentRecord, NameUniqueness};
use crate::transport::ListenAddress;
use crate::types::{AgentState, Did};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fault cause recorded for agents a previous process left mid-lifecycle.
pub const ORPHANED_CAUSE: &str = "orphaned by restart";

/// Agent identity registry
///
/// Each record sits behind its own lock inside a sharded map. Resolvers clone
/// under the read lock; transitions hold the write lock across validation and
/// persistence, so one DID's state machine never runs two transitions at once
/// while unrelated DIDs proceed in parallel.
pub struct IdentityRegistry {
    records: DashMap<Did, Arc<RwLock<AgentRecord>>>,
    /// (role, name) -> DID of the live holder; maintained only for `PerRole`.
    live_names: DashMap<(String, String), Did>,
    uniqueness: NameUniqueness,
    repository: Arc<dyn IdentityRepository>,
}

impl IdentityRegistry {
    /// Open a registry over a repository, loading every stored record.
    ///
    /// Records a previous process left in `starting`, `running` or `stopping`
    /// have no execution context anymore and are moved to `failed`.
    pub fn open(
        repository: Arc<dyn IdentityRepository>,
        uniqueness: NameUniqueness,
    ) -> Result<Self, ApiError> {
        let registry = Self {
            records: DashMap::new(),
            live_names: DashMap::new(),
            uniqueness,
            repository,
        };

        let mut orphaned = 0usize;
        for mut record in registry.repository.load_all()? {
            if matches!(
                record.state,
                AgentState::Starting | AgentState::Running | AgentState::Stopping
            ) {
                record.state = AgentState::Failed;
                record.listen_addr = None;
                record.failure = Some(ORPHANED_CAUSE.to_string());
                record.updated_at = Utc::now();
                registry.repository.save(&record)?;
                orphaned += 1;
            }

            if uniqueness == NameUniqueness::PerRole && !record.state.is_terminal() {
                let key = (record.role.clone(), record.name.clone());
                if let Some(existing) = registry.live_names.get(&key) {
                    warn!(
                        did = %record.did,
                        existing = %existing.value(),
                        name = %record.name,
                        role = %record.role,
                        "Stored records share a live name; keeping the first"
                    );
                } else {
                    registry.live_names.insert(key, record.did.clone());
                }
            }

            registry
                .records
                .insert(record.did.clone(), Arc::new(RwLock::new(record)));
        }

        info!(
            records = registry.records.len(),
            orphaned,
            "Identity registry opened"
        );
        Ok(registry)
    }

    /// Registry over a fresh in-memory repository.
    pub fn in_memory(uniqueness: NameUniqueness) -> Self {
        Self {
            records: DashMap::new(),
            live_names: DashMap::new(),
            uniqueness,
            repository: Arc::new(InMemoryIdentityRepository::new()),
        }
    }

    pub fn uniqueness(&self) -> NameUniqueness {
        self.uniqueness
    }

    /// Issue a new DID and create its record in `registered`.
    pub fn issue(&self, name: &str, role: &str) -> Result<AgentRecord, ApiError> {
        let name = name.trim();
        let role = role.trim();
        if name.is_empty() {
            return Err(ApiError::schema("name", "must be a non-empty string"));
        }
        if role.is_empty() {
            return Err(ApiError::schema("role", "must be a non-empty string"));
        }

        let did = Did::generate();
        let key = (role.to_string(), name.to_string());

        if self.uniqueness == NameUniqueness::PerRole {
            match self.live_names.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    return Err(ApiError::DuplicateNameConflict {
                        name: name.to_string(),
                        role: role.to_string(),
                        existing: existing.get().clone(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(did.clone());
                }
            }
        }

        let record = AgentRecord::new(did.clone(), name.to_string(), role.to_string());
        if let Err(e) = self.repository.save(&record) {
            if self.uniqueness == NameUniqueness::PerRole {
                self.live_names.remove_if(&key, |_, holder| *holder == did);
            }
            return Err(e);
        }

        self.records
            .insert(did.clone(), Arc::new(RwLock::new(record.clone())));
        info!(did = %did, name = %name, role = %role, "Issued agent identity");
        Ok(record)
    }

    /// Resolve a DID to a snapshot of its record.
    pub fn resolve(&self, did: &Did) -> Result<AgentRecord, ApiError> {
        let cell = self.cell(did)?;
        let record = cell.read().clone();
        Ok(record)
    }

    /// Move a record to `new_state`, enforcing the lifecycle state machine.
    pub fn update_state(&self, did: &Did, new_state: AgentState) -> Result<AgentRecord, ApiError> {
        self.transition(did, new_state, |_| {})
    }

    /// `starting -> running`, binding the listen address in the same write.
    pub fn mark_running(&self, did: &Did, addr: ListenAddress) -> Result<AgentRecord, ApiError> {
        self.transition(did, AgentState::Running, |record| {
            record.listen_addr = Some(addr);
        })
    }

    /// Any non-terminal state -> `failed`, keeping the cause for diagnostics.
    pub fn mark_failed(&self, did: &Did, cause: &str) -> Result<AgentRecord, ApiError> {
        self.transition(did, AgentState::Failed, |record| {
            record.failure = Some(cause.to_string());
        })
    }

    /// All records, archived ones included, oldest first.
    pub fn list(&self, role: Option<&str>) -> Vec<AgentRecord> {
        let mut records: Vec<AgentRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().read().clone())
            .filter(|record| role.map_or(true, |r| record.role == r))
            .collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.did.cmp(&b.did))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flush(&self) -> Result<(), ApiError> {
        self.repository.flush()
    }

    fn cell(&self, did: &Did) -> Result<Arc<RwLock<AgentRecord>>, ApiError> {
        self.records
            .get(did)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ApiError::UnknownIdentity(did.clone()))
    }

    fn transition<F>(&self, did: &Did, to: AgentState, apply: F) -> Result<AgentRecord, ApiError>
    where
        F: FnOnce(&mut AgentRecord),
    {
        let cell = self.cell(did)?;
        let mut guard = cell.write();

        let from = guard.state;
        if !from.can_transition_to(to) {
            return Err(ApiError::InvalidTransition {
                did: did.clone(),
                from,
                to,
            });
        }

        let mut next = guard.clone();
        next.state = to;
        next.updated_at = Utc::now();
        apply(&mut next);
        if to != AgentState::Running {
            next.listen_addr = None;
        }

        // Persist before publishing so a failed write leaves the old record visible.
        self.repository.save(&next)?;
        *guard = next.clone();
        drop(guard);

        if to.is_terminal() && self.uniqueness == NameUniqueness::PerRole {
            let key = (next.role.clone(), next.name.clone());
            self.live_names.remove_if(&key, |_, holder| holder == did);
        }

        debug!(did = %did, from = %from, to = %to, "Agent state transition");
        Ok(next)
    }
}
