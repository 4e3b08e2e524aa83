//! wbemx CLI Binary
//!
//! Command-line interface for the WBEM export pipeline.

use clap::Parser;
use std::process;
use tracing::{error, info};
use wbem_export::cli::{Cli, RunContext};
use wbem_export::config::ConfigLoader;
use wbem_export::logging::{init_logging, LoggingConfig};

fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("wbemx starting");

    let context = match RunContext::new(cli.work_dir.clone(), cli.config.clone()) {
        Ok(ctx) => ctx.with_target(cli.host.clone(), cli.namespace.clone(), cli.index_url.clone()),
        Err(e) => {
            error!("Error loading configuration: {}", e);
            eprintln!("{}", wbem_export::cli::map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", wbem_export::cli::map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args, environment, and config file
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = if let Some(ref config_path) = cli.config {
        ConfigLoader::load_from_file(config_path)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    } else {
        ConfigLoader::load(&cli.work_dir)
            .ok()
            .map(|c| c.logging)
            .unwrap_or_default()
    };

    if cli.verbose {
        config.level = "info".to_string();
    }
    if cli.quiet {
        config.level = "error".to_string();
    }

    // Explicit CLI arguments win
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    config
}
