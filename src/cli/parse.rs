//! CLI parse: clap types for wbemx. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wbemx - export CIM/WBEM provider data to CMS/CMDB artifacts
#[derive(Parser)]
#[command(name = "wbemx")]
#[command(about = "Query a CIM/WBEM endpoint and export rendered results to CMS/CMDB targets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Working directory searched for config/config.toml
    #[arg(long, default_value = ".")]
    pub work_dir: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Target host, as named in the [hosts] configuration table
    #[arg(long, short = 'H')]
    pub host: Option<String>,

    /// CIM namespace on the target (overrides host and config defaults)
    #[arg(long)]
    pub namespace: Option<String>,

    /// Provider index location (path or file:// URL)
    #[arg(long)]
    pub index_url: Option<String>,

    /// Log progress at info level
    #[arg(long, short = 'v', conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log errors only
    #[arg(long, short = 'q')]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the classes available on the target
    Classes,
    /// Print every instance of one or more classes
    Describe {
        /// Class names
        #[arg(required = true, value_delimiter = ',')]
        classes: Vec<String>,
    },
    /// Run a WQL query and print the raw response
    Query {
        /// WQL query text
        wql: String,
    },
    /// Query every provider and store the responses
    Snapshot,
    /// List the export destinations
    Destinations {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the resolved providers
    Providers {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Export to one or more named destinations
    Export {
        /// Destination names
        #[arg(required = true, value_delimiter = ',')]
        destinations: Vec<String>,
        /// Export root (overrides manifest.export_root)
        #[arg(long)]
        output_path: Option<PathBuf>,
    },
}
