//! CLI help and command-name contract for routing and logging.

use crate::cli::parse::Commands;

/// Command name string for log records (e.g. "export", "snapshot").
pub fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Classes => "classes",
        Commands::Describe { .. } => "describe",
        Commands::Query { .. } => "query",
        Commands::Snapshot => "snapshot",
        Commands::Destinations { .. } => "destinations",
        Commands::Providers { .. } => "providers",
        Commands::Export { .. } => "export",
    }
}

/// Whether the command talks to a target system and so needs `--host`.
pub fn requires_host(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Destinations { .. } | Commands::Providers { .. }
    )
}

/// Whether the command needs the provider index and mapping.
pub fn requires_manifest(command: &Commands) -> bool {
    !matches!(
        command,
        Commands::Classes | Commands::Describe { .. } | Commands::Query { .. }
    )
}
