//! Response pipeline: extract, render, merge and dispatch.
//!
//! A raw response travels through the [`correlator::ResponseCorrelator`],
//! which strips the trace envelope, renders it with the [`renderer::Renderer`]
//! and either dispatches it directly or hands it to the
//! [`merge::MergeAggregator`].

pub mod correlator;
pub mod descriptor;
pub mod dispatcher;
pub mod envelope;
pub mod merge;
pub mod renderer;

pub use correlator::{CorrelatorState, PendingJob, ResponseCorrelator, ResponseOutcome};
pub use descriptor::{ConsoleStream, OutputTarget};
pub use dispatcher::Dispatcher;
pub use merge::{CompletedMerge, MergeAggregator, MergeHandle};
pub use renderer::{Renderer, StylesheetProcessor, XsltProc};
