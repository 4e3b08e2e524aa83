//! Config facade: one entry point that assembles sources in precedence order.

use super::merge::merge_policy;
use super::sources::{global_file, local_file};
use super::ExportConfig;
use crate::error::ExportError;
use config::{Environment, File};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`ExportConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a working directory.
    ///
    /// Precedence (lowest to highest): built-in defaults, the global file,
    /// `<work_dir>/config/config.toml`, `<work_dir>/config/<WBEMX_ENV>.toml`,
    /// then `WBEMX__SECTION__KEY` environment variables.
    pub fn load(work_dir: &Path) -> Result<ExportConfig, ExportError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder)?;
        let builder = local_file::add_to_builder(builder, work_dir)?;
        let builder = builder.add_source(Self::environment());

        let config: ExportConfig = builder.build()?.try_deserialize()?;
        debug!(work_dir = %work_dir.display(), hosts = config.hosts.len(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from one explicit file (plus defaults and environment).
    pub fn load_from_file(path: &Path) -> Result<ExportConfig, ExportError> {
        if !path.exists() {
            return Err(ExportError::ConfigError(format!(
                "Configuration file {} does not exist",
                path.display()
            )));
        }

        let config: ExportConfig = merge_policy::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(Self::environment())
            .build()?
            .try_deserialize()?;
        debug!(config_path = %path.display(), "Configuration loaded from file");
        Ok(config)
    }

    /// Path of the global configuration file, when a home directory is known.
    pub fn global_config_path() -> Option<PathBuf> {
        global_file::global_config_path()
    }

    fn environment() -> Environment {
        Environment::with_prefix("WBEMX").separator("__")
    }
}
