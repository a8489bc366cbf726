//! Which work item is being processed right now.
//!
//! The audit log layer reads this for every record it ships so that server
//! side logs can be filtered per work item. Only the processing scope in
//! [`Client::process`](crate::client::Client::process) writes it.
//!
//! One `LogContext` is shared by every clone of a `Client` and by the audit
//! layer built from that client. It assumes one open processing scope at a
//! time: consumers that process items concurrently must use one `Client` (and
//! one audit layer) per consumer, or records may be attributed to the wrong
//! item.

use std::sync::{Arc, Mutex, PoisonError};

use crate::model::WorkItemId;

#[derive(Debug, Clone, Default)]
pub struct LogContext {
    current: Arc<Mutex<Option<WorkItemId>>>,
}

impl LogContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// The work item whose processing scope is open, if any.
    pub fn current(&self) -> Option<WorkItemId> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `id` as the item being processed until the guard drops.
    pub(crate) fn begin(&self, id: WorkItemId) -> ContextGuard {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous {
            tracing::warn!(
                %previous,
                current = %id,
                "processing scope opened while another was still open"
            );
        }
        ContextGuard {
            context: self.clone(),
        }
    }

    pub(crate) fn end(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Clears the tracked work item on drop, whatever way the scope ends.
#[must_use = "the context is cleared as soon as the guard is dropped"]
pub(crate) struct ContextGuard {
    context: LogContext,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.context.end();
    }
}
