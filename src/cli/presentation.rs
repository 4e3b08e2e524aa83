//! CLI presentation: text and json formatters per command family.

mod manifest;
mod report;

pub use manifest::{
    format_destinations_json, format_destinations_text, format_providers_json,
    format_providers_text,
};
pub use report::{format_class_list, format_run_report};
