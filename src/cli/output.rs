//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ExportError;

/// Map a domain error to the single diagnostic line printed on failure.
pub fn map_error(e: &ExportError) -> String {
    format!("Error: {}", e.to_string().replace('\n', " "))
}
