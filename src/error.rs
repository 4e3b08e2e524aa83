//! Error types for the WBEM export pipeline.

use thiserror::Error;

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported storage operation: {0}")]
    Unsupported(String),
}

/// Errors raised while resolving manifests, correlating responses and
/// delivering artifacts.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Render {render_id} not found: {path} is not accessible")]
    RenderNotFound { render_id: String, path: String },

    #[error("Bad output descriptor \"{descriptor}\": {reason}")]
    BadDescriptor { descriptor: String, reason: String },

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timed out after {millis} ms waiting for response to {subject}")]
    Timeout { subject: String, millis: u64 },

    #[error("Correlator is busy with query {pending}; refusing to submit {rejected}")]
    CorrelatorBusy { pending: String, rejected: String },

    #[error("Transform failed: {0}")]
    RenderFailed(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl From<config::ConfigError> for ExportError {
    fn from(err: config::ConfigError) -> Self {
        ExportError::ConfigError(err.to_string())
    }
}

impl ExportError {
    /// Whether the error ends the whole run rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ExportError::ConfigError(_)
                | ExportError::NotFound(_)
                | ExportError::CorrelatorBusy { .. }
        )
    }

    pub(crate) fn bad_descriptor(descriptor: &str, reason: impl Into<String>) -> Self {
        ExportError::BadDescriptor {
            descriptor: descriptor.to_string(),
            reason: reason.into(),
        }
    }
}
