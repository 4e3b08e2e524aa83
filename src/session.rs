//! Export session: the single-worker driver.
//!
//! Providers are queried strictly one at a time. For each query the session
//! arms the correlator, submits the request, then waits (bounded by the
//! response timeout) for the response to be consumed before moving on.

use crate::client::{CimXmlClient, QueryClient, QueryRequest, QueryToken, ResponseReceiver};
use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::export::{Dispatcher, PendingJob, Renderer, ResponseCorrelator, XsltProc};
use crate::manifest::{DestinationSpec, Manifest, ProviderSpec};
use crate::storage::open_stores;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{error, info, warn};

/// A job that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub subject: String,
    pub message: String,
}

/// Summary of one snapshot, export or discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub queries: usize,
    pub delivered: usize,
    pub failures: Vec<RunFailure>,
    /// Merge sets dropped because a member never reported
    pub dropped_merges: Vec<String>,
}

impl RunReport {
    fn fail(&mut self, subject: &str, err: &ExportError) {
        error!(subject, error = %err, "Job failed");
        self.failures.push(RunFailure {
            subject: subject.to_string(),
            message: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.dropped_merges.is_empty()
    }
}

/// Per-run settings that do not come from the manifest.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Namespace for providers that name none
    pub namespace: String,
    pub response_timeout: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &ExportConfig) -> Self {
        Self {
            namespace: config.client.namespace.clone(),
            response_timeout: config.client.response_timeout(),
        }
    }
}

pub struct ExportSession {
    client: Arc<dyn QueryClient>,
    responses: ResponseReceiver,
    correlator: ResponseCorrelator,
    manifest: Manifest,
    options: SessionOptions,
}

impl ExportSession {
    pub fn new(
        client: Arc<dyn QueryClient>,
        responses: ResponseReceiver,
        correlator: ResponseCorrelator,
        manifest: Manifest,
        options: SessionOptions,
    ) -> Self {
        Self {
            client,
            responses,
            correlator,
            manifest,
            options,
        }
    }

    /// Wire a session for host `host_name` from configuration.
    ///
    /// `export_root` overrides the configured export root.
    pub fn open(
        config: &ExportConfig,
        host_name: &str,
        manifest: Manifest,
        export_root: Option<PathBuf>,
    ) -> Result<Self, ExportError> {
        let host = config.host(host_name)?;
        let (tx, rx) = crate::client::response_channel();
        let client = CimXmlClient::new(host, &config.client, tx)?;

        let mut options = SessionOptions::from_config(config);
        if let Some(namespace) = host.namespace()? {
            options.namespace = namespace;
        }

        let renderer = Renderer::new(
            config.manifest.renderers.clone(),
            Arc::new(XsltProc::new(config.client.stylesheet_processor.clone())),
        );
        let dispatcher =
            Dispatcher::new(export_root.unwrap_or_else(|| config.manifest.export_root.clone()));
        let correlator = ResponseCorrelator::new(client.host_label(), renderer, dispatcher)
            .with_stores(open_stores(&config.storage)?);

        Ok(Self::new(Arc::new(client), rx, correlator, manifest, options))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) {
        self.options.namespace = namespace.into();
    }

    /// Query every provider and store its identity-rendered response.
    pub async fn snapshot(&mut self) -> Result<RunReport, ExportError> {
        let mut report = RunReport::default();
        let providers: Vec<ProviderSpec> = self.manifest.providers.iter().cloned().collect();
        info!(host = %self.client.host_label(), providers = providers.len(), "Snapshot started");

        for provider in &providers {
            let job = PendingJob::Store {
                provider_id: provider.id.clone(),
                object_class: provider.object_class.clone(),
            };
            self.run_provider(provider, job, &mut report).await?;
        }

        info!(queries = report.queries, delivered = report.delivered, "Snapshot finished");
        Ok(report)
    }

    /// Export to each named destination in turn.
    ///
    /// Every name is checked before the first query is issued; an unknown
    /// name fails the run with [`ExportError::NotFound`].
    pub async fn export(&mut self, names: &[String]) -> Result<RunReport, ExportError> {
        let destinations: Vec<DestinationSpec> = names
            .iter()
            .map(|name| {
                self.manifest
                    .destinations
                    .get_destination_by_name(name)
                    .cloned()
            })
            .collect::<Result<_, _>>()?;

        let mut report = RunReport::default();
        for destination in &destinations {
            self.export_destination(destination, &mut report).await?;
        }

        for dropped in self.correlator.merges().drain_incomplete() {
            warn!(
                render_id = %dropped.render_id,
                output = %dropped.output,
                missing = ?dropped.missing,
                "Merge incomplete; nothing written"
            );
            report.dropped_merges.push(format!(
                "{} (missing: {})",
                dropped.render_id,
                dropped.missing.join(", ")
            ));
        }
        Ok(report)
    }

    async fn export_destination(
        &mut self,
        destination: &DestinationSpec,
        report: &mut RunReport,
    ) -> Result<(), ExportError> {
        info!(
            destination = %destination.name,
            title = %destination.title,
            queries = destination.query_count(),
            "Export started"
        );

        for map_ref in &destination.refs {
            let provider = self.manifest.providers.require(&map_ref.provider_id)?.clone();
            let job = PendingJob::Direct {
                provider_id: provider.id.clone(),
                renders: map_ref.renders.clone(),
            };
            self.run_provider(&provider, job, report).await?;
        }

        for set in &destination.merge_sets {
            let handle = self.correlator.merges().begin(set);
            for member in &set.refs {
                let provider = self.manifest.providers.require(&member.provider_id)?.clone();
                let job = PendingJob::Merge {
                    provider_id: provider.id.clone(),
                    handle,
                };
                self.run_provider(&provider, job, report).await?;
            }
        }
        Ok(())
    }

    /// Query each class and print the raw responses.
    pub async fn describe(&mut self, classes: &[String]) -> Result<RunReport, ExportError> {
        let mut report = RunReport::default();
        for class in classes {
            let request = QueryRequest::ExecQuery {
                namespace: self.options.namespace.clone(),
                query: format!("SELECT * FROM {}", class),
            };
            self.run_printed(class, request, &mut report).await;
        }
        Ok(report)
    }

    /// Issue one WQL query and print the raw response.
    pub async fn query(&mut self, wql: &str) -> Result<RunReport, ExportError> {
        let mut report = RunReport::default();
        let request = QueryRequest::ExecQuery {
            namespace: self.options.namespace.clone(),
            query: wql.to_string(),
        };
        self.run_printed(wql, request, &mut report).await;
        Ok(report)
    }

    /// Class names available in the session namespace.
    pub async fn classes(&self) -> Result<Vec<String>, ExportError> {
        self.client
            .enumerate_class_names(&self.options.namespace)
            .await
    }

    async fn run_provider(
        &mut self,
        provider: &ProviderSpec,
        job: PendingJob,
        report: &mut RunReport,
    ) -> Result<(), ExportError> {
        let request = match QueryRequest::for_provider(provider, &self.options.namespace) {
            Ok(r) => r,
            Err(e) => {
                report.fail(&provider.id, &e);
                return Ok(());
            }
        };

        let token = QueryToken::next();
        // a busy correlator means the single in-flight invariant is broken
        self.correlator.submit(token, job)?;
        self.execute(&provider.id, token, request, report).await;
        Ok(())
    }

    async fn run_printed(&mut self, subject: &str, request: QueryRequest, report: &mut RunReport) {
        self.execute(subject, QueryToken::next(), request, report)
            .await;
    }

    /// Submit one query and wait until its response has been consumed.
    async fn execute(
        &mut self,
        subject: &str,
        token: QueryToken,
        request: QueryRequest,
        report: &mut RunReport,
    ) {
        report.queries += 1;
        info!(%token, subject, request = %request, "Query submitted");

        // the deadline also covers transports that answer inside submit
        let deadline = Instant::now() + self.options.response_timeout;
        match timeout_at(deadline, self.client.submit(token, request)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.correlator.cancel();
                report.fail(subject, &e);
                return;
            }
            Err(_) => {
                self.timed_out(subject, report);
                return;
            }
        }

        let armed = !self.correlator.state().is_idle();
        loop {
            match timeout_at(deadline, self.responses.recv()).await {
                Err(_) => {
                    self.timed_out(subject, report);
                    return;
                }
                Ok(None) => {
                    self.correlator.cancel();
                    report.fail(
                        subject,
                        &ExportError::QueryError("Response channel closed".to_string()),
                    );
                    return;
                }
                Ok(Some(response)) => {
                    let answered = response.token.map_or(true, |t| t == token);
                    let outcome = self.correlator.on_raw_response(response);
                    report.delivered += outcome.delivered;
                    for failure in &outcome.failures {
                        report.fail(subject, failure);
                    }
                    // unarmed queries are printed through passthrough
                    if answered && (armed != outcome.is_passthrough()) {
                        return;
                    }
                }
            }
        }
    }

    fn timed_out(&mut self, subject: &str, report: &mut RunReport) {
        self.correlator.cancel();
        let err = ExportError::Timeout {
            subject: subject.to_string(),
            millis: self.options.response_timeout.as_millis() as u64,
        };
        report.fail(subject, &err);
    }
}

impl std::fmt::Debug for ExportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportSession")
            .field("host", &self.client.host_label())
            .field("correlator", &self.correlator)
            .field("options", &self.options)
            .finish()
    }
}
