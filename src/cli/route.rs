//! CLI route: single route table and run context. Dispatches to the export
//! session and presentation.

use crate::config::{validation_failure, ConfigLoader, ExportConfig};
use crate::error::ExportError;
use crate::manifest::Manifest;
use crate::session::ExportSession;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::cli::help::{command_name, requires_host, requires_manifest};
use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_class_list, format_destinations_json, format_destinations_text, format_providers_json,
    format_providers_text, format_run_report,
};

/// Runtime context for CLI execution: loaded configuration plus the target
/// selection given on the command line.
pub struct RunContext {
    config: ExportConfig,
    work_dir: PathBuf,
    host: Option<String>,
    namespace: Option<String>,
    index_url: Option<String>,
}

impl RunContext {
    /// Load and validate configuration from `config_path`, or from the layered
    /// sources rooted at `work_dir`.
    pub fn new(work_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self, ExportError> {
        let config = if let Some(ref cfg_path) = config_path {
            ConfigLoader::load_from_file(cfg_path)?
        } else {
            ConfigLoader::load(&work_dir)?
        };
        config.validate().map_err(|errors| validation_failure(&errors))?;
        Ok(Self::from_config(config, work_dir))
    }

    pub fn from_config(config: ExportConfig, work_dir: PathBuf) -> Self {
        Self {
            config,
            work_dir,
            host: None,
            namespace: None,
            index_url: None,
        }
    }

    pub fn with_target(
        mut self,
        host: Option<String>,
        namespace: Option<String>,
        index_url: Option<String>,
    ) -> Self {
        self.host = host;
        self.namespace = namespace;
        self.index_url = index_url;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn work_dir(&self) -> &PathBuf {
        &self.work_dir
    }

    /// Execute a CLI command via the single route table.
    pub fn execute(&self, command: &Commands) -> Result<String, ExportError> {
        let name = command_name(command);
        info!(command = name, "Executing command");
        if requires_host(command) && self.host.is_none() {
            return Err(ExportError::ConfigError(format!(
                "--host is required for {}",
                name
            )));
        }

        let manifest = if requires_manifest(command) {
            self.load_manifest()?
        } else {
            Manifest::default()
        };

        match command {
            Commands::Destinations { format } => {
                if manifest.destinations.is_empty() {
                    return Err(ExportError::NotFound(
                        "No destination export renders are available.".to_string(),
                    ));
                }
                match format.as_str() {
                    "json" => format_destinations_json(&manifest.destinations),
                    _ => Ok(format_destinations_text(&manifest.destinations)),
                }
            }
            Commands::Providers { format } => match format.as_str() {
                "json" => format_providers_json(&manifest.providers),
                _ => Ok(format_providers_text(&manifest.providers)),
            },
            _ => self.execute_remote(command, manifest),
        }
    }

    fn execute_remote(&self, command: &Commands, manifest: Manifest) -> Result<String, ExportError> {
        let name = command_name(command);
        let host = self
            .host
            .clone()
            .ok_or_else(|| ExportError::ConfigError(format!("--host is required for {}", name)))?;

        let export_root = match command {
            Commands::Export { output_path, .. } => output_path.clone(),
            _ => None,
        };

        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| ExportError::ConfigError(format!("Failed to create runtime: {}", e)))?;

        rt.block_on(async {
            let mut session = ExportSession::open(&self.config, &host, manifest, export_root)?;
            if let Some(namespace) = &self.namespace {
                session.set_namespace(namespace.clone());
            }
            debug!(?session, "Session opened");

            match command {
                Commands::Classes => session.classes().await.map(|c| format_class_list(&c)),
                Commands::Describe { classes } => session
                    .describe(classes)
                    .await
                    .map(|r| format_run_report(name, &r)),
                Commands::Query { wql } => session
                    .query(wql)
                    .await
                    .map(|r| format_run_report(name, &r)),
                Commands::Snapshot => session
                    .snapshot()
                    .await
                    .map(|r| format_run_report(name, &r)),
                Commands::Export { destinations, .. } => session
                    .export(destinations)
                    .await
                    .map(|r| format_run_report(name, &r)),
                Commands::Destinations { .. } | Commands::Providers { .. } => Ok(String::new()),
            }
        })
    }

    fn load_manifest(&self) -> Result<Manifest, ExportError> {
        let manifest_config = &self.config.manifest;
        match &self.index_url {
            Some(index) => Manifest::load_from(
                index,
                &manifest_config.map,
                manifest_config.compat_includes,
            ),
            None => Manifest::load(manifest_config),
        }
    }
}
