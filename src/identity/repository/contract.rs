use crate::error::ApiError;
use crate::identity::AgentRecord;

/// Persistence port for agent records.
///
/// There is no delete: terminated and failed records are archived.
pub trait IdentityRepository: Send + Sync {
    fn load_all(&self) -> Result<Vec<AgentRecord>, ApiError>;
    /// Insert or overwrite the record stored under its DID.
    fn save(&self, record: &AgentRecord) -> Result<(), ApiError>;
    fn flush(&self) -> Result<(), ApiError>;
}
