//! Shared test utilities for integration tests
//!
//! A scripted in-memory query client, stylesheet processor doubles and a
//! filesystem fixture holding manifests, stylesheets and the export root.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wbem_export::client::{
    response_channel, QueryClient, QueryRequest, QueryToken, RawResponse, ResponseSender,
};
use wbem_export::error::ExportError;
use wbem_export::export::{Dispatcher, Renderer, ResponseCorrelator, StylesheetProcessor};
use wbem_export::manifest::Manifest;
use wbem_export::session::{ExportSession, SessionOptions};

/// Scripted behavior for one query text or class name.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Deliver this body tagged with the query's token
    Respond(String),
    /// Deliver this body without a token
    RespondUntagged(String),
    /// Accept the query but never answer
    Silent,
    /// Never return from submit
    Stall,
    /// Fail submission with a query error
    Fail(String),
}

/// In-memory [`QueryClient`] answering from a script.
pub struct ScriptedClient {
    host: String,
    responses: ResponseSender,
    script: Mutex<HashMap<String, Scripted>>,
    submitted: Mutex<Vec<QueryRequest>>,
    classes: Vec<String>,
}

impl ScriptedClient {
    pub fn new(host: &str, responses: ResponseSender) -> Self {
        Self {
            host: host.to_string(),
            responses,
            script: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            classes: vec!["CIM_ComputerSystem".to_string(), "CIM_OperatingSystem".to_string()],
        }
    }

    /// Script the answer for a query text (or class name for instance enumeration).
    pub fn on(&self, key: &str, behavior: Scripted) -> &Self {
        self.script.lock().insert(key.to_string(), behavior);
        self
    }

    pub fn submitted(&self) -> Vec<QueryRequest> {
        self.submitted.lock().clone()
    }
}

fn script_key(request: &QueryRequest) -> &str {
    match request {
        QueryRequest::ExecQuery { query, .. } => query,
        QueryRequest::EnumerateInstances { class, .. } => class,
    }
}

#[async_trait]
impl QueryClient for ScriptedClient {
    async fn submit(&self, token: QueryToken, request: QueryRequest) -> Result<(), ExportError> {
        let behavior = self
            .script
            .lock()
            .get(script_key(&request))
            .cloned()
            .unwrap_or_else(|| Scripted::Respond(cim_document(script_key(&request))));
        self.submitted.lock().push(request);

        let response = match behavior {
            Scripted::Respond(body) => RawResponse::new(Some(token), body),
            Scripted::RespondUntagged(body) => RawResponse::new(None, body),
            Scripted::Silent => return Ok(()),
            Scripted::Stall => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                return Ok(());
            }
            Scripted::Fail(msg) => return Err(ExportError::QueryError(msg)),
        };
        self.responses
            .send(response)
            .map_err(|_| ExportError::QueryError("Response channel closed".to_string()))
    }

    async fn enumerate_class_names(&self, _namespace: &str) -> Result<Vec<String>, ExportError> {
        Ok(self.classes.clone())
    }

    fn host_label(&self) -> &str {
        &self.host
    }
}

/// A raw trace message wrapping a CIM document whose single value is `marker`.
pub fn cim_response(marker: &str) -> String {
    format!("HTTP/1.1 200 OK\r\nContent-Type: application/xml\r\n\r\n{}\r\n", cim_document(marker))
}

pub fn cim_document(marker: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><CIM CIMVERSION=\"2.0\"><VALUE>{}</VALUE></CIM>",
        marker
    )
}

/// Returns the document unchanged.
pub struct PassThrough;

impl StylesheetProcessor for PassThrough {
    fn transform(&self, _stylesheet: &Path, document: &str) -> Result<String, ExportError> {
        Ok(document.to_string())
    }
}

/// Prefixes the document with the stylesheet's render id.
pub struct Tagging;

impl StylesheetProcessor for Tagging {
    fn transform(&self, stylesheet: &Path, document: &str) -> Result<String, ExportError> {
        let id = stylesheet
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("[{}]{}", id, document))
    }
}

/// Temporary tree holding manifests, stylesheets and the export root.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn renderers(&self) -> PathBuf {
        self.dir.path().join("renderers")
    }

    pub fn export_root(&self) -> PathBuf {
        self.dir.path().join("export")
    }

    pub fn stylesheet(&self, render_id: &str) -> PathBuf {
        self.write(
            &format!("renderers/{}.xsl", render_id),
            "<xsl:stylesheet version=\"1.0\"/>",
        )
    }

    pub fn manifest(&self, index: &str, map: &str) -> Manifest {
        let index = self.write("manifest/index.xml", index);
        let map = self.write("manifest/map.xml", map);
        Manifest::load_from(&index.to_string_lossy(), &map, false).unwrap()
    }

    pub fn correlator(&self, host: &str, processor: Arc<dyn StylesheetProcessor>) -> ResponseCorrelator {
        ResponseCorrelator::new(
            host,
            Renderer::new(self.renderers(), processor),
            Dispatcher::with_writers(
                self.export_root(),
                Box::new(std::io::sink()),
                Box::new(std::io::sink()),
            ),
        )
    }

    /// Session on a scripted client for `hostA`.
    pub fn session(
        &self,
        manifest: Manifest,
        processor: Arc<dyn StylesheetProcessor>,
    ) -> (ExportSession, Arc<ScriptedClient>) {
        let (tx, rx) = response_channel();
        let client = Arc::new(ScriptedClient::new("hostA", tx));
        let session = ExportSession::new(
            client.clone(),
            rx,
            self.correlator("hostA", processor),
            manifest,
            SessionOptions {
                namespace: "root/cimv2".to_string(),
                response_timeout: Duration::from_millis(200),
            },
        );
        (session, client)
    }
}
