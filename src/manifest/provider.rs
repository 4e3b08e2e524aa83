//! Provider definitions: one named query against the target system.

use crate::error::ExportError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How a provider's data is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    /// Issue the provider's WQL query
    Static,
    /// Enumerate all instances of the provider's class
    InstanceEnum,
}

impl FromStr for AccessType {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "static" | "query" => Ok(AccessType::Static),
            "instance" | "instances" | "enum" => Ok(AccessType::InstanceEnum),
            other => Err(ExportError::ConfigError(format!(
                "Unknown access type \"{}\" (expected 'static' or 'instance')",
                other
            ))),
        }
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessType::Static => write!(f, "static"),
            AccessType::InstanceEnum => write!(f, "instance"),
        }
    }
}

/// A provider: a named, parameterized query against the management endpoint.
///
/// `query` is never empty. When the manifest gives no query (or only
/// whitespace) it is synthesized as `SELECT * FROM <class>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSpec {
    pub id: String,
    pub namespace: String,
    pub object_class: Option<String>,
    pub access_type: AccessType,
    pub query: String,
    pub title: String,
}

impl ProviderSpec {
    /// Build a provider from its manifest attributes.
    ///
    /// `path` has the form `namespace[:class]`.
    pub fn new(
        path: &str,
        id: &str,
        title: &str,
        access_type: AccessType,
        query: Option<&str>,
    ) -> Result<Self, ExportError> {
        if id.trim().is_empty() {
            return Err(ExportError::ConfigError(format!(
                "Unable to parse object without an id (path: {})",
                path
            )));
        }

        let (namespace, object_class) = split_path(path);
        let query = match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => q.to_string(),
            None => match &object_class {
                Some(class) => format!("SELECT * FROM {}", class),
                None => {
                    return Err(ExportError::ConfigError(format!(
                        "Unable to parse object! Path: {}, ID: {}",
                        path, id
                    )))
                }
            },
        };

        if access_type == AccessType::InstanceEnum && object_class.is_none() {
            return Err(ExportError::ConfigError(format!(
                "Object {} enumerates instances but its path {} names no class",
                id, path
            )));
        }

        Ok(Self {
            id: id.trim().to_string(),
            namespace,
            object_class,
            access_type,
            query,
            title: title.to_string(),
        })
    }

    /// Namespace to query, falling back when the manifest left it empty.
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.namespace.is_empty() {
            fallback
        } else {
            &self.namespace
        }
    }
}

fn split_path(path: &str) -> (String, Option<String>) {
    match path.split_once(':') {
        Some((namespace, class)) => {
            let class = class.trim();
            (
                namespace.trim().to_string(),
                if class.is_empty() {
                    None
                } else {
                    Some(class.to_string())
                },
            )
        }
        None => (path.trim().to_string(), None),
    }
}

/// Resolved provider table keyed by id.
#[derive(Debug, Clone, Default)]
pub struct ProviderIndex {
    providers: BTreeMap<String, ProviderSpec>,
}

impl ProviderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a provider, replacing any earlier definition with the same id.
    pub fn insert(&mut self, spec: ProviderSpec) -> Option<ProviderSpec> {
        self.providers.insert(spec.id.clone(), spec)
    }

    pub fn get(&self, id: &str) -> Option<&ProviderSpec> {
        self.providers.get(id)
    }

    pub fn require(&self, id: &str) -> Result<&ProviderSpec, ExportError> {
        self.get(id)
            .ok_or_else(|| ExportError::NotFound(format!("Provider \"{}\" is not defined.", id)))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// First pair of ids that differ only by letter case.
    ///
    /// Snapshot keys fold case, so such a pair would share one stored message.
    pub fn case_collision(&self) -> Option<(&str, &str)> {
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();
        for id in self.providers.keys() {
            if let Some(previous) = seen.insert(id.to_lowercase(), id) {
                return Some((previous, id));
            }
        }
        None
    }

    /// Providers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.providers.values()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl FromIterator<ProviderSpec> for ProviderIndex {
    fn from_iter<I: IntoIterator<Item = ProviderSpec>>(iter: I) -> Self {
        let mut index = ProviderIndex::new();
        for spec in iter {
            index.insert(spec);
        }
        index
    }
}
