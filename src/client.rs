//! Query client abstraction.
//!
//! A [`QueryClient`] submits one query at a time and later delivers the raw
//! protocol document on a response channel. Every submission carries a
//! [`QueryToken`] that the client echoes on the [`RawResponse`], so the
//! correlator can tell a late or foreign response from the one it waits for.

use crate::error::ExportError;
use crate::manifest::{AccessType, ProviderSpec};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub mod cimxml;

pub use cimxml::CimXmlClient;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Correlation token for one submitted query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryToken(u64);

impl QueryToken {
    pub fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// What to ask the endpoint for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryRequest {
    /// WQL query in a namespace
    ExecQuery { namespace: String, query: String },
    /// Every instance of a class
    EnumerateInstances { namespace: String, class: String },
}

impl QueryRequest {
    /// Request for `provider`, using `default_namespace` when it names none.
    pub fn for_provider(provider: &ProviderSpec, default_namespace: &str) -> Result<Self, ExportError> {
        let namespace = provider.namespace_or(default_namespace).to_string();
        match provider.access_type {
            AccessType::Static => Ok(QueryRequest::ExecQuery {
                namespace,
                query: provider.query.clone(),
            }),
            AccessType::InstanceEnum => {
                let class = provider.object_class.clone().ok_or_else(|| {
                    ExportError::ConfigError(format!(
                        "Provider \"{}\" enumerates instances but names no class",
                        provider.id
                    ))
                })?;
                Ok(QueryRequest::EnumerateInstances { namespace, class })
            }
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            QueryRequest::ExecQuery { namespace, .. } => namespace,
            QueryRequest::EnumerateInstances { namespace, .. } => namespace,
        }
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryRequest::ExecQuery { namespace, query } => write!(f, "{} [{}]", query, namespace),
            QueryRequest::EnumerateInstances { namespace, class } => {
                write!(f, "instances of {} [{}]", class, namespace)
            }
        }
    }
}

/// A response as delivered on the response channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// Token of the query this answers, when the transport knows it
    pub token: Option<QueryToken>,
    pub body: String,
}

impl RawResponse {
    pub fn new(token: Option<QueryToken>, body: impl Into<String>) -> Self {
        Self {
            token,
            body: body.into(),
        }
    }
}

pub type ResponseSender = mpsc::UnboundedSender<RawResponse>;
pub type ResponseReceiver = mpsc::UnboundedReceiver<RawResponse>;

/// Channel pair linking a client to the session that consumes its responses.
pub fn response_channel() -> (ResponseSender, ResponseReceiver) {
    mpsc::unbounded_channel()
}

/// Client for the remote management endpoint.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// Submit `request`. The response document arrives on the client's
    /// response channel tagged with `token`. The returned future may resolve
    /// as soon as the request is handed off or only after the response has
    /// been delivered; callers bound both by the response timeout.
    async fn submit(&self, token: QueryToken, request: QueryRequest) -> Result<(), ExportError>;

    /// Names of the classes available in `namespace`.
    async fn enumerate_class_names(&self, namespace: &str) -> Result<Vec<String>, ExportError>;

    /// Label of the target system, used for export directories.
    fn host_label(&self) -> &str;
}
