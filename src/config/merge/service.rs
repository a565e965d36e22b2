//! MergeService: orchestrates sources, applies precedence, deserializes to DirectoryConfig.

use crate::config::sources::{environment, file};
use crate::config::DirectoryConfig;
use config::{Config, ConfigError};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> global file -> explicit file -> environment (highest).
    pub fn load(explicit: Option<&Path>) -> Result<DirectoryConfig, ConfigError> {
        let builder = Config::builder();
        let builder = file::add_global(builder)?;
        let builder = match explicit {
            Some(path) => file::add_explicit(builder, path)?,
            None => builder,
        };
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }

    /// Load one file with environment overlay, skipping the global file.
    pub fn load_from_file(path: &Path) -> Result<DirectoryConfig, ConfigError> {
        let builder = file::add_explicit(Config::builder(), path)?;
        let builder = environment::add_to_builder(builder)?;

        builder.build()?.try_deserialize()
    }
}
