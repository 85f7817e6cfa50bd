use std::collections::HashMap;
use std::sync::Arc;

use matrx_types::ToolInvocationResult;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{ClientError, Result};

pub type Completion = oneshot::Sender<Result<ToolInvocationResult>>;

struct PendingEntry {
    tool: String,
    tx: Completion,
}

/// Correlation id → waiting caller. Each entry leaves the table exactly once:
/// on response, timeout, caller abort, or session shutdown. The lock is only
/// held for the map operation, never across an await.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if `id` is already waiting.
    pub fn register(
        &self,
        id: &str,
        tool: &str,
    ) -> Option<oneshot::Receiver<Result<ToolInvocationResult>>> {
        let mut map = self.inner.lock();
        if map.contains_key(id) {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        map.insert(
            id.to_string(),
            PendingEntry {
                tool: tool.to_string(),
                tx,
            },
        );
        Some(rx)
    }

    /// Removes and completes `id`. `false` when nobody was waiting, which is
    /// the normal fate of a response that arrives after its timeout.
    pub fn resolve(&self, id: &str, outcome: Result<ToolInvocationResult>) -> bool {
        let entry = self.inner.lock().remove(id);
        match entry {
            Some(entry) => {
                if entry.tx.send(outcome).is_err() {
                    tracing::debug!("Caller for {} ({}) went away before completion", id, entry.tool);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) -> bool {
        self.inner.lock().remove(id).is_some()
    }

    /// Completes every waiter with an error from `make_error`; returns how many.
    pub fn fail_all(&self, make_error: impl Fn() -> ClientError) -> usize {
        let drained: Vec<(String, PendingEntry)> = self.inner.lock().drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(make_error()));
        }
        count
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }
}

/// Drops the pending entry when the waiting future goes away early.
pub struct PendingGuard {
    table: PendingRequests,
    id: String,
}

impl PendingGuard {
    pub fn new(table: &PendingRequests, id: impl Into<String>) -> Self {
        Self {
            table: table.clone(),
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}
