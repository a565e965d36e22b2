//! Environment variable source: MAPLE_* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Add environment variable overlay to builder.
/// `MAPLE_ROUTER__MAX_ATTEMPTS=3` sets `router.max_attempts`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let builder = builder.add_source(
        Environment::with_prefix("MAPLE")
            .prefix_separator("_")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("api.restricted_roles")
            .try_parsing(true),
    );
    Ok(builder)
}
