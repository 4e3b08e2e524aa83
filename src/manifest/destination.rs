//! Destination mapping: which providers feed which rendered artifacts.
//!
//! ```xml
//! <map>
//!   <destination name="cmdb" title="Example CMDB">
//!     <ref id="os">
//!       <render id="os-summary" out="file:os.xml"/>
//!       <render id="os-text" out="console:stdout"/>
//!     </ref>
//!   </destination>
//!   <destination name="inventory" title="Inventory">
//!     <merge id="inventory" out="file:inventory.xml">
//!       <ref id="os"/>
//!       <ref id="pkgs"/>
//!     </merge>
//!   </destination>
//! </map>
//! ```

use super::provider::ProviderIndex;
use crate::error::ExportError;
use crate::export::descriptor::{OutputTarget, CONSOLE_STDOUT, MEDIA_CONSOLE};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// One transform applied to a response, and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderAction {
    pub render_id: String,
    pub output: String,
}

impl RenderAction {
    pub fn new(render_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            render_id: render_id.into(),
            output: output.into(),
        }
    }

    pub fn target(&self) -> Result<OutputTarget, ExportError> {
        OutputTarget::parse(&self.output)
    }
}

/// A provider reference with the renders its response feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapRef {
    pub provider_id: String,
    pub renders: Vec<RenderAction>,
}

/// Several providers whose responses are combined, then rendered once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeSet {
    pub render_id: String,
    pub output: String,
    pub refs: Vec<MapRef>,
}

impl MergeSet {
    pub fn action(&self) -> RenderAction {
        RenderAction::new(self.render_id.clone(), self.output.clone())
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.refs.iter().map(|r| r.provider_id.as_str())
    }
}

/// A named export target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DestinationSpec {
    pub name: String,
    pub title: String,
    pub refs: Vec<MapRef>,
    pub merge_sets: Vec<MergeSet>,
}

impl DestinationSpec {
    /// Number of queries an export of this destination issues.
    pub fn query_count(&self) -> usize {
        self.refs.len() + self.merge_sets.iter().map(|m| m.refs.len()).sum::<usize>()
    }
}

/// All destinations from one mapping document, in document order.
#[derive(Debug, Clone, Default)]
pub struct DestinationMap {
    destinations: Vec<DestinationSpec>,
}

impl DestinationMap {
    /// Load the mapping document at `path`, checking every reference against `providers`.
    pub fn load(path: &Path, providers: &ProviderIndex) -> Result<Self, ExportError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::ConfigError(format!("Unable to read mapping {}: {}", path.display(), e))
        })?;
        Self::parse(&text, providers)
    }

    pub fn parse(text: &str, providers: &ProviderIndex) -> Result<Self, ExportError> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| ExportError::ConfigError(format!("Malformed mapping document: {}", e)))?;

        let mut destinations = Vec::new();
        let mut seen = HashSet::new();
        for node in doc
            .descendants()
            .filter(|n| n.is_element() && n.has_tag_name("destination"))
        {
            let destination = parse_destination(node, providers)?;
            if !seen.insert(destination.name.clone()) {
                return Err(ExportError::ConfigError(format!(
                    "Destination \"{}\" is defined more than once",
                    destination.name
                )));
            }
            debug!(
                destination = %destination.name,
                refs = destination.refs.len(),
                merge_sets = destination.merge_sets.len(),
                "Destination loaded"
            );
            destinations.push(destination);
        }

        Ok(Self { destinations })
    }

    pub fn from_destinations(destinations: Vec<DestinationSpec>) -> Self {
        Self { destinations }
    }

    pub fn get_destination_by_name(&self, name: &str) -> Result<&DestinationSpec, ExportError> {
        self.destinations
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| ExportError::NotFound(format!("Destination \"{}\" not recognized.", name)))
    }

    pub fn destinations(&self) -> &[DestinationSpec] {
        &self.destinations
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

fn parse_destination(
    node: roxmltree::Node<'_, '_>,
    providers: &ProviderIndex,
) -> Result<DestinationSpec, ExportError> {
    let name = node.attribute("name").unwrap_or("").trim().to_string();
    if name.is_empty() {
        return Err(ExportError::ConfigError(
            "Destination without a name".to_string(),
        ));
    }
    let fail = |msg: String| ExportError::ConfigError(format!("Destination \"{}\": {}", name, msg));

    let mut refs = Vec::new();
    let mut merge_sets = Vec::new();
    for child in node.children().filter(|n| n.is_element()) {
        match child.tag_name().name() {
            "ref" => refs.push(parse_ref(child, providers).map_err(|e| fail(e))?),
            "merge" => merge_sets.push(parse_merge(child, providers).map_err(|e| fail(e))?),
            _ => {}
        }
    }

    Ok(DestinationSpec {
        title: node.attribute("title").unwrap_or(&name).to_string(),
        name,
        refs,
        merge_sets,
    })
}

fn checked_provider_id(
    node: roxmltree::Node<'_, '_>,
    providers: &ProviderIndex,
) -> Result<String, String> {
    let id = node.attribute("id").unwrap_or("").trim();
    if id.is_empty() {
        return Err("reference without a provider id".to_string());
    }
    if !providers.contains(id) {
        return Err(format!("unknown provider \"{}\"", id));
    }
    Ok(id.to_string())
}

fn checked_action(render_id: &str, output: &str) -> Result<RenderAction, String> {
    if render_id.trim().is_empty() {
        return Err("render without an id".to_string());
    }
    OutputTarget::parse(output).map_err(|e| e.to_string())?;
    Ok(RenderAction::new(render_id.trim(), output))
}

fn parse_ref(node: roxmltree::Node<'_, '_>, providers: &ProviderIndex) -> Result<MapRef, String> {
    let provider_id = checked_provider_id(node, providers)?;
    let mut renders = Vec::new();

    // Single-render shorthand: <ref id=".." render=".." out=".."/>
    if let Some(render_id) = node.attribute("render") {
        let default_out = format!("{}:{}", MEDIA_CONSOLE, CONSOLE_STDOUT);
        let output = node.attribute("out").unwrap_or(&default_out);
        renders.push(checked_action(render_id, output)?);
    }

    for render in node
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("render"))
    {
        renders.push(checked_action(
            render.attribute("id").unwrap_or(""),
            render.attribute("out").unwrap_or(""),
        )?);
    }

    Ok(MapRef {
        provider_id,
        renders,
    })
}

fn parse_merge(node: roxmltree::Node<'_, '_>, providers: &ProviderIndex) -> Result<MergeSet, String> {
    let action = checked_action(
        node.attribute("id").unwrap_or(""),
        node.attribute("out").unwrap_or(""),
    )?;

    let mut refs = Vec::new();
    for child in node
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("ref"))
    {
        refs.push(MapRef {
            provider_id: checked_provider_id(child, providers)?,
            renders: Vec::new(),
        });
    }
    if refs.is_empty() {
        return Err(format!("merge \"{}\" has no refs", action.render_id));
    }

    Ok(MergeSet {
        render_id: action.render_id,
        output: action.output,
        refs,
    })
}
