//! Manifest presentation: destination and provider listings.

use crate::error::ExportError;
use crate::manifest::{DestinationMap, ProviderIndex};
use comfy_table::Table;
use serde_json::json;

fn to_json(value: &serde_json::Value) -> Result<String, ExportError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ExportError::ConfigError(format!("Failed to serialize output: {}", e)))
}

pub fn format_destinations_text(map: &DestinationMap) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Title", "Providers", "Merges"]);
    for d in map.destinations() {
        table.add_row(vec![
            d.name.clone(),
            d.title.clone(),
            d.query_count().to_string(),
            d.merge_sets.len().to_string(),
        ]);
    }
    table.to_string()
}

pub fn format_destinations_json(map: &DestinationMap) -> Result<String, ExportError> {
    to_json(&json!({ "destinations": map.destinations() }))
}

pub fn format_providers_text(index: &ProviderIndex) -> String {
    if index.is_empty() {
        return "No providers defined.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["ID", "Title", "Namespace", "Access", "Query"]);
    for p in index.iter() {
        table.add_row(vec![
            p.id.clone(),
            p.title.clone(),
            if p.namespace.is_empty() {
                "-".to_string()
            } else {
                p.namespace.clone()
            },
            p.access_type.to_string(),
            p.query.clone(),
        ]);
    }
    table.to_string()
}

pub fn format_providers_json(index: &ProviderIndex) -> Result<String, ExportError> {
    let providers: Vec<_> = index.iter().collect();
    to_json(&json!({ "providers": providers }))
}
