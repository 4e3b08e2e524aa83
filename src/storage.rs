//! Snapshot storage.
//!
//! A snapshot stores each provider's identity-rendered response under the
//! provider id. Backends implement [`MessageStore`] and are selected by
//! configuration; several may be active at once.

use crate::config::{StorageBackend, StorageConfig};
use crate::error::StorageError;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

pub mod database;
pub mod file;

pub use database::SledMessageStore;
pub use file::FileMessageStore;

/// One provider's payload captured from one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotMessage {
    pub host: String,
    pub provider_id: String,
    pub object_class: Option<String>,
    /// RFC 3339 capture time
    pub captured_at: String,
    pub payload: String,
}

impl SnapshotMessage {
    pub fn new(
        host: impl Into<String>,
        provider_id: impl Into<String>,
        object_class: Option<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            provider_id: provider_id.into(),
            object_class,
            captured_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            payload: payload.into(),
        }
    }

    /// Storage key: provider ids are case-insensitive on disk.
    pub fn key(&self) -> String {
        format!("{}/{}", self.host, self.provider_id.to_lowercase())
    }

    pub fn digest(&self) -> String {
        content_digest(&self.payload)
    }
}

/// Result of comparing a message with what a store already holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MessageDiff {
    /// Nothing stored yet under this key
    New,
    Unchanged,
    Changed { previous: String, current: String },
}

impl fmt::Display for MessageDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageDiff::New => write!(f, "new"),
            MessageDiff::Unchanged => write!(f, "unchanged"),
            MessageDiff::Changed { .. } => write!(f, "changed"),
        }
    }
}

impl MessageDiff {
    pub(crate) fn between(previous: Option<String>, current: String) -> Self {
        match previous {
            None => MessageDiff::New,
            Some(previous) if previous == current => MessageDiff::Unchanged,
            Some(previous) => MessageDiff::Changed { previous, current },
        }
    }
}

/// Snapshot storage capability.
pub trait MessageStore: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Store `message`, replacing any earlier payload under the same key.
    fn store_message(&self, message: &SnapshotMessage) -> Result<(), StorageError>;

    /// Compare `message` with the stored payload under its key.
    fn diff_message(&self, message: &SnapshotMessage) -> Result<MessageDiff, StorageError>;
}

/// Hex blake3 digest of a payload.
pub fn content_digest(payload: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Open every backend named in `config`.
pub fn open_stores(config: &StorageConfig) -> Result<Vec<Box<dyn MessageStore>>, StorageError> {
    let mut stores: Vec<Box<dyn MessageStore>> = Vec::new();
    for backend in &config.backends {
        match backend {
            StorageBackend::File => {
                stores.push(Box::new(FileMessageStore::new(&config.path, config.compression)?))
            }
            StorageBackend::Sled => {
                stores.push(Box::new(SledMessageStore::new(config.path.join("snapshots.db"))?))
            }
        }
    }
    Ok(stores)
}
