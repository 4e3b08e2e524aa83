//! Manifest: provider index resolution and destination mapping.
//!
//! The provider index names the queries that can be issued against a target
//! system; the destination map says which providers feed which rendered
//! artifacts. Both are loaded once per run and are immutable afterwards.

use crate::config::ManifestConfig;
use crate::error::ExportError;
use std::path::Path;
use tracing::{info, warn};

pub mod destination;
pub mod provider;
pub mod resolver;

pub use destination::{DestinationMap, DestinationSpec, MapRef, MergeSet, RenderAction};
pub use provider::{AccessType, ProviderIndex, ProviderSpec};
pub use resolver::ManifestResolver;

/// Concatenated text content of an element (text and CDATA children, recursively).
pub(crate) fn element_text(node: roxmltree::Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

/// Resolved providers together with the destinations built on them.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub providers: ProviderIndex,
    pub destinations: DestinationMap,
}

impl Manifest {
    /// Load the configured index and mapping documents.
    pub fn load(config: &ManifestConfig) -> Result<Self, ExportError> {
        Self::load_from(&config.index.to_string_lossy(), &config.map, config.compat_includes)
    }

    /// Load from an index location (path or `file://` URL) and a mapping path.
    ///
    /// A missing mapping document yields a manifest without destinations.
    pub fn load_from(index: &str, map: &Path, compat_includes: bool) -> Result<Self, ExportError> {
        let providers = ManifestResolver::new()
            .with_compat_includes(compat_includes)
            .resolve_location(index)?;

        let destinations = if map.exists() {
            DestinationMap::load(map, &providers)?
        } else {
            warn!(map = %map.display(), "Mapping document not found; no destinations available");
            DestinationMap::default()
        };

        info!(
            providers = providers.len(),
            destinations = destinations.destinations().len(),
            "Manifest loaded"
        );
        Ok(Self {
            providers,
            destinations,
        })
    }
}
