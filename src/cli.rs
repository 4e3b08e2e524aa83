//! CLI domain: parse, route, help, output, and presentation only.
//! No domain orchestration; single route table dispatches to the export session.

mod help;
mod output;
mod parse;
mod presentation;
mod route;

pub use help::{command_name, requires_host, requires_manifest};
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_class_list, format_destinations_json, format_destinations_text, format_providers_json,
    format_providers_text, format_run_report,
};
pub use route::RunContext;
