use crate::error::{ApiError, StorageError};
use crate::identity::repository::IdentityRepository;
use crate::identity::AgentRecord;
use std::path::Path;
use tracing::debug;

const RECORDS_TREE: &str = "records";

/// Sled-backed record store. Values are bincode-encoded `AgentRecord`s keyed by DID.
pub struct SledIdentityRepository {
    db: sled::Db,
    records: sled::Tree,
}

impl SledIdentityRepository {
    pub fn open(path: &Path) -> Result<Self, ApiError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Store that lives only as long as the process.
    pub fn temporary() -> Result<Self, ApiError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, ApiError> {
        let records = db.open_tree(RECORDS_TREE)?;
        Ok(Self { db, records })
    }
}

impl IdentityRepository for SledIdentityRepository {
    fn load_all(&self) -> Result<Vec<AgentRecord>, ApiError> {
        let mut loaded = Vec::with_capacity(self.records.len());
        for entry in self.records.iter() {
            let (key, value) = entry?;
            let record: AgentRecord = bincode::deserialize(&value).map_err(|e| {
                StorageError::Corrupt {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    detail: e.to_string(),
                }
            })?;
            loaded.push(record);
        }
        debug!(count = loaded.len(), "Loaded agent records");
        Ok(loaded)
    }

    fn save(&self, record: &AgentRecord) -> Result<(), ApiError> {
        let bytes = bincode::serialize(record).map_err(StorageError::from)?;
        self.records.insert(record.did.as_str().as_bytes(), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), ApiError> {
        self.db.flush()?;
        Ok(())
    }
}
