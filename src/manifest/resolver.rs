//! Provider index resolution.
//!
//! An index document wraps `object` and `include` elements in a single
//! `objects` container. Includes are followed depth-first in document order,
//! and a later definition of an id replaces an earlier one.

use super::element_text;
use super::provider::{AccessType, ProviderIndex, ProviderSpec};
use crate::error::ExportError;
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Include nesting limit when the cycle guard is disabled.
pub const MAX_INCLUDE_DEPTH: usize = 64;

/// Resolves a root index document and its includes into a [`ProviderIndex`].
#[derive(Debug, Clone, Default)]
pub struct ManifestResolver {
    compat_includes: bool,
}

#[derive(Debug)]
enum IndexEntry {
    Include(PathBuf),
    Object(ProviderSpec),
}

struct OpenDocument {
    key: PathBuf,
    entries: std::vec::IntoIter<IndexEntry>,
}

impl ManifestResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve without the include cycle guard. Nesting is still capped at
    /// [`MAX_INCLUDE_DEPTH`].
    pub fn with_compat_includes(mut self, enabled: bool) -> Self {
        self.compat_includes = enabled;
        self
    }

    /// Resolve from a location given as a filesystem path or a `file://` URL.
    pub fn resolve_location(&self, location: &str) -> Result<ProviderIndex, ExportError> {
        let cwd = std::env::current_dir()?;
        self.resolve(&include_path(location, &cwd)?)
    }

    /// Resolve the root index document at `root`.
    pub fn resolve(&self, root: &Path) -> Result<ProviderIndex, ExportError> {
        let mut index = ProviderIndex::new();
        let mut active: HashSet<PathBuf> = HashSet::new();
        let mut stack: Vec<OpenDocument> = Vec::new();

        let first = open_document(root)?;
        active.insert(first.key.clone());
        stack.push(first);

        loop {
            let next = match stack.last_mut() {
                Some(doc) => doc.entries.next(),
                None => break,
            };

            match next {
                Some(IndexEntry::Object(spec)) => {
                    if let Some(previous) = index.insert(spec) {
                        debug!(provider_id = %previous.id, "Provider redefined by a later index entry");
                    }
                }
                Some(IndexEntry::Include(path)) => {
                    let key = canonical_key(&path);
                    if !self.compat_includes && active.contains(&key) {
                        return Err(ExportError::ConfigError(format!(
                            "Include cycle detected at {}",
                            path.display()
                        )));
                    }
                    if stack.len() >= MAX_INCLUDE_DEPTH {
                        return Err(ExportError::ConfigError(format!(
                            "Includes nested deeper than {} levels at {}",
                            MAX_INCLUDE_DEPTH,
                            path.display()
                        )));
                    }
                    let doc = open_document(&path)?;
                    active.insert(doc.key.clone());
                    stack.push(doc);
                }
                None => {
                    if let Some(done) = stack.pop() {
                        // Only the innermost occurrence leaves the chain; compat mode may
                        // hold the same key more than once.
                        if !stack.iter().any(|d| d.key == done.key) {
                            active.remove(&done.key);
                        }
                    }
                }
            }
        }

        if let Some((first, second)) = index.case_collision() {
            return Err(ExportError::ConfigError(format!(
                "Provider ids \"{}\" and \"{}\" differ only by case",
                first, second
            )));
        }
        if index.is_empty() {
            warn!(index = %root.display(), "Provider index resolved to no providers");
        }
        Ok(index)
    }
}

fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn open_document(path: &Path) -> Result<OpenDocument, ExportError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        ExportError::ConfigError(format!("Unable to read index {}: {}", path.display(), e))
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let entries = parse_index(&text, base_dir)
        .map_err(|e| prefix_source(e, path))?;
    debug!(index = %path.display(), entries = entries.len(), "Index document parsed");
    Ok(OpenDocument {
        key: canonical_key(path),
        entries: entries.into_iter(),
    })
}

fn prefix_source(err: ExportError, path: &Path) -> ExportError {
    match err {
        ExportError::ConfigError(msg) => {
            ExportError::ConfigError(format!("{}: {}", path.display(), msg))
        }
        other => other,
    }
}

fn parse_index(text: &str, base_dir: &Path) -> Result<Vec<IndexEntry>, ExportError> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| ExportError::ConfigError(format!("Malformed index document: {}", e)))?;

    let containers: Vec<_> = doc
        .descendants()
        .filter(|n| n.is_element() && n.has_tag_name("objects"))
        .collect();
    if containers.len() != 1 {
        return Err(ExportError::ConfigError(format!(
            "Source is invalid: expected one <objects> container, found {}",
            containers.len()
        )));
    }

    let mut entries = Vec::new();
    for node in containers[0].children().filter(|n| n.is_element()) {
        match node.tag_name().name() {
            "include" => {
                let url = node.attribute("url").unwrap_or("");
                entries.push(IndexEntry::Include(include_path(url, base_dir)?));
            }
            "object" => {
                let query = node
                    .children()
                    .find(|n| n.is_element() && n.has_tag_name("query"))
                    .map(element_text);
                let access_type: AccessType = node.attribute("type").unwrap_or("").parse()?;
                entries.push(IndexEntry::Object(ProviderSpec::new(
                    node.attribute("path").unwrap_or(""),
                    node.attribute("id").unwrap_or(""),
                    node.attribute("title").unwrap_or(""),
                    access_type,
                    query.as_deref(),
                )?));
            }
            other => debug!(element = other, "Ignoring unknown index element"),
        }
    }
    Ok(entries)
}

/// Map an include reference to a local path.
///
/// `file://` URLs are used as-is, scheme-less references resolve against the
/// including document's directory, and every other scheme is rejected.
fn include_path(reference: &str, base_dir: &Path) -> Result<PathBuf, ExportError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(ExportError::ConfigError("Include without a url".to_string()));
    }

    if !reference.contains("://") && !reference.starts_with("file:") {
        return Ok(base_dir.join(reference));
    }

    let url = Url::parse(reference).map_err(|e| {
        ExportError::ConfigError(format!("Invalid include url {}: {}", reference, e))
    })?;
    if url.scheme() != "file" {
        return Err(ExportError::ConfigError(format!(
            "Protocol {} is not supported for includes ({})",
            url.scheme(),
            reference
        )));
    }
    url.to_file_path()
        .map_err(|_| ExportError::ConfigError(format!("Include url {} is not a local file", reference)))
}
