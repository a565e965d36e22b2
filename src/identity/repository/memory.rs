use crate::error::ApiError;
use crate::identity::repository::IdentityRepository;
use crate::identity::AgentRecord;
use crate::types::Did;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Non-durable repository for ephemeral nodes and tests.
#[derive(Default)]
pub struct InMemoryIdentityRepository {
    records: RwLock<HashMap<Did, AgentRecord>>,
}

impl InMemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with pre-existing records, as if loaded from an earlier process.
    pub fn with_records(records: Vec<AgentRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.did.clone(), r)).collect();
        Self {
            records: RwLock::new(map),
        }
    }
}

impl IdentityRepository for InMemoryIdentityRepository {
    fn load_all(&self) -> Result<Vec<AgentRecord>, ApiError> {
        Ok(self.records.read().values().cloned().collect())
    }

    fn save(&self, record: &AgentRecord) -> Result<(), ApiError> {
        self.records
            .write()
            .insert(record.did.clone(), record.clone());
        Ok(())
    }

    fn flush(&self) -> Result<(), ApiError> {
        Ok(())
    }
}
