//! Response correlation.
//!
//! Exactly one job is pending at a time. The driver arms the correlator with
//! a token before submitting the query; the response carrying that token (or
//! no token at all) consumes the job and returns the correlator to `Idle`
//! whatever happens downstream.

use super::dispatcher::Dispatcher;
use super::envelope::extract_payload;
use super::merge::{MergeAggregator, MergeHandle};
use super::renderer::Renderer;
use crate::client::{QueryToken, RawResponse};
use crate::error::ExportError;
use crate::manifest::RenderAction;
use crate::storage::{MessageStore, SnapshotMessage};
use std::mem;
use tracing::{debug, error, info, warn};

/// Work attached to one outstanding query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingJob {
    /// Render the response with each action and dispatch the results
    Direct {
        provider_id: String,
        renders: Vec<RenderAction>,
    },
    /// Contribute the response to an open merge
    Merge {
        provider_id: String,
        handle: MergeHandle,
    },
    /// Write the identity-rendered response to the snapshot stores
    Store {
        provider_id: String,
        object_class: Option<String>,
    },
}

impl PendingJob {
    pub fn provider_id(&self) -> &str {
        match self {
            PendingJob::Direct { provider_id, .. }
            | PendingJob::Merge { provider_id, .. }
            | PendingJob::Store { provider_id, .. } => provider_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelatorState {
    Idle,
    AwaitingDirect {
        token: QueryToken,
        provider_id: String,
        renders: Vec<RenderAction>,
    },
    AwaitingMerge {
        token: QueryToken,
        provider_id: String,
        handle: MergeHandle,
    },
    AwaitingStore {
        token: QueryToken,
        provider_id: String,
        object_class: Option<String>,
    },
}

impl CorrelatorState {
    fn armed(token: QueryToken, job: PendingJob) -> Self {
        match job {
            PendingJob::Direct {
                provider_id,
                renders,
            } => CorrelatorState::AwaitingDirect {
                token,
                provider_id,
                renders,
            },
            PendingJob::Merge {
                provider_id,
                handle,
            } => CorrelatorState::AwaitingMerge {
                token,
                provider_id,
                handle,
            },
            PendingJob::Store {
                provider_id,
                object_class,
            } => CorrelatorState::AwaitingStore {
                token,
                provider_id,
                object_class,
            },
        }
    }

    pub fn token(&self) -> Option<QueryToken> {
        match self {
            CorrelatorState::Idle => None,
            CorrelatorState::AwaitingDirect { token, .. }
            | CorrelatorState::AwaitingMerge { token, .. }
            | CorrelatorState::AwaitingStore { token, .. } => Some(*token),
        }
    }

    pub fn provider_id(&self) -> Option<&str> {
        match self {
            CorrelatorState::Idle => None,
            CorrelatorState::AwaitingDirect { provider_id, .. }
            | CorrelatorState::AwaitingMerge { provider_id, .. }
            | CorrelatorState::AwaitingStore { provider_id, .. } => Some(provider_id),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CorrelatorState::Idle)
    }
}

/// What happened to one response.
#[derive(Debug, Default)]
pub struct ResponseOutcome {
    /// Provider whose job consumed the response; `None` for passthrough
    pub provider_id: Option<String>,
    /// Artifacts written or printed, and snapshots stored
    pub delivered: usize,
    /// Response was buffered in a merge that is still open
    pub buffered: bool,
    /// Downstream failures, already logged
    pub failures: Vec<ExportError>,
}

impl ResponseOutcome {
    fn consumed(provider_id: &str) -> Self {
        Self {
            provider_id: Some(provider_id.to_string()),
            ..Self::default()
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.provider_id.is_none()
    }

    fn fail(&mut self, err: ExportError) {
        error!(provider_id = ?self.provider_id, error = %err, "Response handling failed");
        self.failures.push(err);
    }
}

/// Matches raw responses to the pending job and runs the job's pipeline.
pub struct ResponseCorrelator {
    state: CorrelatorState,
    host_label: String,
    renderer: Renderer,
    dispatcher: Dispatcher,
    merges: MergeAggregator,
    stores: Vec<Box<dyn MessageStore>>,
}

impl ResponseCorrelator {
    pub fn new(host_label: impl Into<String>, renderer: Renderer, dispatcher: Dispatcher) -> Self {
        Self {
            state: CorrelatorState::Idle,
            host_label: host_label.into(),
            renderer,
            dispatcher,
            merges: MergeAggregator::new(),
            stores: Vec::new(),
        }
    }

    pub fn with_stores(mut self, stores: Vec<Box<dyn MessageStore>>) -> Self {
        self.stores = stores;
        self
    }

    pub fn state(&self) -> &CorrelatorState {
        &self.state
    }

    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    pub fn merges(&mut self) -> &mut MergeAggregator {
        &mut self.merges
    }

    /// Arm the correlator for the response to `token`.
    ///
    /// Fails with [`ExportError::CorrelatorBusy`] unless idle; the pending job
    /// is left untouched.
    pub fn submit(&mut self, token: QueryToken, job: PendingJob) -> Result<(), ExportError> {
        if let Some(pending) = self.state.token() {
            return Err(ExportError::CorrelatorBusy {
                pending: pending.to_string(),
                rejected: token.to_string(),
            });
        }
        debug!(%token, provider_id = job.provider_id(), "Correlator armed");
        self.state = CorrelatorState::armed(token, job);
        Ok(())
    }

    /// Drop the pending job, if any, and return to `Idle`.
    pub fn cancel(&mut self) -> CorrelatorState {
        mem::replace(&mut self.state, CorrelatorState::Idle)
    }

    /// Consume `response`.
    ///
    /// A response matching the pending job runs that job; anything else is
    /// printed through the dispatcher's passthrough.
    pub fn on_raw_response(&mut self, response: RawResponse) -> ResponseOutcome {
        let matches_pending = match (self.state.token(), response.token) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(pending), Some(token)) => pending == token,
        };

        let payload = extract_payload(&response.body);
        if !matches_pending {
            if let Some(token) = response.token {
                warn!(%token, pending = ?self.state.token(), "Response does not match the pending query");
            }
            let mut outcome = ResponseOutcome::default();
            if let Err(e) = self.dispatcher.passthrough(payload) {
                outcome.fail(e);
            }
            return outcome;
        }

        match mem::replace(&mut self.state, CorrelatorState::Idle) {
            CorrelatorState::Idle => ResponseOutcome::default(),
            CorrelatorState::AwaitingDirect {
                provider_id,
                renders,
                ..
            } => self.run_direct(&provider_id, &renders, payload),
            CorrelatorState::AwaitingMerge {
                provider_id,
                handle,
                ..
            } => self.run_merge(&provider_id, handle, payload),
            CorrelatorState::AwaitingStore {
                provider_id,
                object_class,
                ..
            } => self.run_store(&provider_id, object_class, payload),
        }
    }

    fn render_and_dispatch(
        &self,
        outcome: &mut ResponseOutcome,
        document: &str,
        action: &RenderAction,
    ) {
        let result = self
            .renderer
            .render(document, Some(&action.render_id))
            .and_then(|text| self.dispatcher.dispatch(&text, &self.host_label, &action.output));
        match result {
            Ok(_) => {
                info!(render_id = %action.render_id, output = %action.output, "Writing");
                outcome.delivered += 1;
            }
            Err(e) => outcome.fail(e),
        }
    }

    fn run_direct(&self, provider_id: &str, renders: &[RenderAction], payload: &str) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::consumed(provider_id);
        if renders.is_empty() {
            debug!(provider_id, "No renders attached; response discarded");
        }
        for action in renders {
            self.render_and_dispatch(&mut outcome, payload, action);
        }
        outcome
    }

    fn run_merge(&mut self, provider_id: &str, handle: MergeHandle, payload: &str) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::consumed(provider_id);
        match self.merges.accept(handle, provider_id, payload.to_string()) {
            Ok(None) => outcome.buffered = true,
            Ok(Some(done)) => {
                let action = RenderAction::new(done.render_id, done.output);
                self.render_and_dispatch(&mut outcome, &done.document, &action);
            }
            Err(e) => outcome.fail(e),
        }
        outcome
    }

    fn run_store(&self, provider_id: &str, object_class: Option<String>, payload: &str) -> ResponseOutcome {
        let mut outcome = ResponseOutcome::consumed(provider_id);
        let payload = match self.renderer.render(payload, None) {
            Ok(p) => p,
            Err(e) => {
                outcome.fail(e);
                return outcome;
            }
        };

        let message = SnapshotMessage::new(&self.host_label, provider_id, object_class, payload);
        for store in &self.stores {
            let result = store
                .diff_message(&message)
                .and_then(|diff| store.store_message(&message).map(|_| diff));
            match result {
                Ok(diff) => {
                    info!(backend = store.name(), provider_id, %diff, "Snapshot stored");
                    outcome.delivered += 1;
                }
                Err(e) => outcome.fail(e.into()),
            }
        }
        outcome
    }
}

impl std::fmt::Debug for ResponseCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCorrelator")
            .field("state", &self.state)
            .field("host_label", &self.host_label)
            .field("open_merges", &self.merges.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::renderer::StylesheetProcessor;
    use crate::manifest::{MapRef, MergeSet};
    use crate::storage::FileMessageStore;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct PassThrough;

    impl StylesheetProcessor for PassThrough {
        fn transform(&self, _stylesheet: &Path, document: &str) -> Result<String, ExportError> {
            Ok(document.to_string())
        }
    }

    fn correlator(dir: &TempDir) -> ResponseCorrelator {
        let renderers = dir.path().join("renderers");
        std::fs::create_dir_all(&renderers).unwrap();
        for id in ["r1", "inventory"] {
            std::fs::write(renderers.join(format!("{}.xsl", id)), "<xsl:stylesheet/>").unwrap();
        }
        ResponseCorrelator::new(
            "hostA",
            Renderer::new(renderers, Arc::new(PassThrough)),
            Dispatcher::with_writers(
                dir.path().join("export"),
                Box::new(std::io::sink()),
                Box::new(std::io::sink()),
            ),
        )
    }

    fn direct(provider_id: &str, render_id: &str, out: &str) -> PendingJob {
        PendingJob::Direct {
            provider_id: provider_id.to_string(),
            renders: vec![RenderAction::new(render_id, out)],
        }
    }

    #[test]
    fn test_second_submit_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        let first = QueryToken::next();
        c.submit(first, direct("p1", "r1", "file:a.txt")).unwrap();

        let err = c
            .submit(QueryToken::next(), direct("p2", "r1", "file:b.txt"))
            .unwrap_err();
        assert!(matches!(err, ExportError::CorrelatorBusy { .. }));
        assert_eq!(c.state().token(), Some(first));
        assert_eq!(c.state().provider_id(), Some("p1"));
    }

    #[test]
    fn test_direct_job_writes_and_returns_to_idle() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        let token = QueryToken::next();
        c.submit(token, direct("p1", "r1", "file:out.txt")).unwrap();

        let outcome = c.on_raw_response(RawResponse::new(
            Some(token),
            "noise<?xml version=\"1.0\"?><CIM><A/></CIM>trailer",
        ));
        assert_eq!(outcome.provider_id.as_deref(), Some("p1"));
        assert_eq!(outcome.delivered, 1);
        assert!(c.state().is_idle());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("export/hostA/out.txt")).unwrap(),
            "<?xml version=\"1.0\"?><CIM><A/></CIM>"
        );
    }

    #[test]
    fn test_downstream_failure_still_clears_job() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        c.submit(QueryToken::next(), direct("p1", "missing", "file:x.txt"))
            .unwrap();

        let outcome = c.on_raw_response(RawResponse::new(None, "<CIM/>"));
        assert_eq!(outcome.delivered, 0);
        assert!(matches!(outcome.failures[0], ExportError::RenderNotFound { .. }));
        assert!(c.state().is_idle());
        c.submit(QueryToken::next(), direct("p2", "r1", "file:y.txt"))
            .unwrap();
    }

    #[test]
    fn test_foreign_token_passes_through() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        let token = QueryToken::next();
        c.submit(token, direct("p1", "r1", "file:out.txt")).unwrap();

        let outcome = c.on_raw_response(RawResponse::new(Some(QueryToken::next()), "<CIM/>"));
        assert!(outcome.is_passthrough());
        assert_eq!(c.state().token(), Some(token));
    }

    #[test]
    fn test_idle_response_passes_through() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        let outcome = c.on_raw_response(RawResponse::new(None, "<CIM/>"));
        assert!(outcome.is_passthrough());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_merge_job_dispatches_once_complete() {
        let dir = TempDir::new().unwrap();
        let mut c = correlator(&dir);
        let set = MergeSet {
            render_id: "inventory".to_string(),
            output: "file:inventory.xml".to_string(),
            refs: ["a", "b"]
                .iter()
                .map(|id| MapRef {
                    provider_id: id.to_string(),
                    renders: Vec::new(),
                })
                .collect(),
        };
        let handle = c.merges().begin(&set);

        for (id, body) in [("a", "<A/>"), ("b", "<B/>")] {
            let token = QueryToken::next();
            c.submit(
                token,
                PendingJob::Merge {
                    provider_id: id.to_string(),
                    handle,
                },
            )
            .unwrap();
            let outcome = c.on_raw_response(RawResponse::new(Some(token), body));
            assert_eq!(outcome.buffered, id == "a");
        }

        assert_eq!(
            std::fs::read_to_string(dir.path().join("export/hostA/inventory.xml")).unwrap(),
            "<MERGED><A/><B/></MERGED>"
        );
    }

    #[test]
    fn test_store_job_writes_identity_payload() {
        let dir = TempDir::new().unwrap();
        let store = FileMessageStore::new(dir.path().join("store"), false).unwrap();
        let mut c = correlator(&dir).with_stores(vec![Box::new(store)]);
        let token = QueryToken::next();
        c.submit(
            token,
            PendingJob::Store {
                provider_id: "OS".to_string(),
                object_class: None,
            },
        )
        .unwrap();

        let outcome = c.on_raw_response(RawResponse::new(Some(token), "<CIM>\n<A/>\r\n</CIM>"));
        assert_eq!(outcome.delivered, 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("store/hostA/os.xml")).unwrap(),
            "<CIM><A/></CIM>"
        );
    }
}
