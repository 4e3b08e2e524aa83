//! Merge aggregation: buffer the responses of a merge set until every
//! member has reported, then combine them in ref order.

use super::envelope::strip_declaration;
use crate::error::ExportError;
use crate::manifest::MergeSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Root element wrapping combined merge documents.
pub const MERGED_ELEMENT: &str = "MERGED";

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identifies one open merge buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MergeHandle(u64);

impl MergeHandle {
    fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MergeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "merge-{}", self.0)
    }
}

/// A merge set whose members have all reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMerge {
    pub render_id: String,
    pub output: String,
    pub document: String,
}

/// A merge set abandoned before every member reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteMerge {
    pub render_id: String,
    pub output: String,
    pub missing: Vec<String>,
}

#[derive(Debug)]
struct MergeBuffer {
    set: MergeSet,
    parts: Vec<Option<String>>,
}

impl MergeBuffer {
    fn missing(&self) -> Vec<String> {
        self.set
            .refs
            .iter()
            .zip(&self.parts)
            .filter(|(_, part)| part.is_none())
            .map(|(r, _)| r.provider_id.clone())
            .collect()
    }

    fn combine(self) -> CompletedMerge {
        let mut document = format!("<{}>", MERGED_ELEMENT);
        for part in self.parts.iter().flatten() {
            document.push_str(strip_declaration(part).trim_end());
        }
        document.push_str(&format!("</{}>", MERGED_ELEMENT));
        CompletedMerge {
            render_id: self.set.render_id,
            output: self.set.output,
            document,
        }
    }
}

/// Open merge buffers, keyed by handle.
#[derive(Debug, Default)]
pub struct MergeAggregator {
    buffers: HashMap<MergeHandle, MergeBuffer>,
}

impl MergeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a buffer for `set`.
    pub fn begin(&mut self, set: &MergeSet) -> MergeHandle {
        let handle = MergeHandle::next();
        self.buffers.insert(
            handle,
            MergeBuffer {
                parts: vec![None; set.refs.len()],
                set: set.clone(),
            },
        );
        debug!(%handle, render_id = %set.render_id, members = set.refs.len(), "Merge opened");
        handle
    }

    /// Record `part` for `provider_id`. Returns the combined document once the
    /// last member arrives; the buffer is closed at that point.
    pub fn accept(
        &mut self,
        handle: MergeHandle,
        provider_id: &str,
        part: String,
    ) -> Result<Option<CompletedMerge>, ExportError> {
        let buffer = self
            .buffers
            .get_mut(&handle)
            .ok_or_else(|| ExportError::NotFound(format!("No open merge for {}", handle)))?;

        let slot = buffer
            .set
            .refs
            .iter()
            .zip(buffer.parts.iter())
            .position(|(r, p)| r.provider_id == provider_id && p.is_none())
            .ok_or_else(|| {
                ExportError::NotFound(format!(
                    "Provider \"{}\" has no open slot in merge \"{}\"",
                    provider_id, buffer.set.render_id
                ))
            })?;
        buffer.parts[slot] = Some(part);

        if buffer.parts.iter().all(Option::is_some) {
            let done = self.buffers.remove(&handle).map(MergeBuffer::combine);
            debug!(%handle, "Merge complete");
            Ok(done)
        } else {
            Ok(None)
        }
    }

    /// Drop a buffer without emitting anything.
    pub fn abandon(&mut self, handle: MergeHandle) -> Option<IncompleteMerge> {
        self.buffers.remove(&handle).map(|b| IncompleteMerge {
            missing: b.missing(),
            render_id: b.set.render_id,
            output: b.set.output,
        })
    }

    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Close every open buffer, reporting what each was still waiting for.
    pub fn drain_incomplete(&mut self) -> Vec<IncompleteMerge> {
        let handles: Vec<MergeHandle> = self.buffers.keys().copied().collect();
        let mut incomplete: Vec<IncompleteMerge> =
            handles.into_iter().filter_map(|h| self.abandon(h)).collect();
        incomplete.sort_by(|a, b| a.render_id.cmp(&b.render_id));
        incomplete
    }
}
