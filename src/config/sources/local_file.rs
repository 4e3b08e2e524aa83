//! Local config file source: config/config.toml and config/{env}.toml under the working directory

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

/// Add local config files to builder.
/// Precedence: config/config.toml (base) then config/{WBEMX_ENV}.toml (env-specific).
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    work_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let config_dir = work_dir.join("config");
    let env_name = std::env::var("WBEMX_ENV").unwrap_or_else(|_| "production".to_string());

    let mut builder = builder;

    let base_config_path = config_dir.join("config.toml");
    if base_config_path.exists() {
        builder = builder.add_source(File::from(base_config_path.as_path()).required(false));
    }

    let env_config_path = config_dir.join(format!("{}.toml", env_name));
    if env_config_path.exists() {
        builder = builder.add_source(File::from(env_config_path.as_path()).required(false));
    }

    Ok(builder)
}
