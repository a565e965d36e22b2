//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::DirectoryConfig;
use crate::error::ApiError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from the standard sources plus an optional explicit file,
    /// then validate it.
    pub fn load(explicit: Option<&Path>) -> Result<DirectoryConfig, ApiError> {
        let config = MergeService::load(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<DirectoryConfig, ApiError> {
        let config = MergeService::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Create default configuration.
    pub fn default() -> DirectoryConfig {
        DirectoryConfig::default()
    }
}
