use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use matrx_client::ClientError;
use matrx_types::{ToolInput, ToolInvocationResult};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::invoker::ToolInvoker;

pub const HISTORY_LIMIT: usize = 50;
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

const ABORTED: &str = "aborted";

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionHistoryEntry {
    pub id: String,
    pub tool_name: String,
    pub params: ToolInput,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
    pub result: Option<ToolInvocationResult>,
    pub error: Option<String>,
    pub status: ExecutionStatus,
}

impl ExecutionHistoryEntry {
    fn finish(&mut self, elapsed_ms: u64, result: Option<ToolInvocationResult>, error: Option<String>) {
        self.status = if error.is_some() {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Success
        };
        self.completed_at = Some(Utc::now());
        self.elapsed_ms = Some(elapsed_ms);
        self.result = result;
        self.error = error;
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExecutionSnapshot {
    pub loading: bool,
    pub result: Option<ToolInvocationResult>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
    /// Most recent first.
    pub history: Vec<ExecutionHistoryEntry>,
}

struct ActiveRun {
    entry_id: String,
    started: Instant,
    cancel: CancellationToken,
    ticker: JoinHandle<()>,
}

#[derive(Default)]
struct TrackerState {
    active: Option<ActiveRun>,
    loading: bool,
    result: Option<ToolInvocationResult>,
    error: Option<String>,
    elapsed_ms: u64,
    history: VecDeque<ExecutionHistoryEntry>,
}

impl TrackerState {
    fn entry_mut(&mut self, id: &str) -> Option<&mut ExecutionHistoryEntry> {
        self.history.iter_mut().find(|entry| entry.id == id)
    }

    fn is_active(&self, entry_id: &str) -> bool {
        self.active.as_ref().is_some_and(|run| run.entry_id == entry_id)
    }
}

/// Runs tools one foreground invocation at a time and keeps a bounded
/// history of every run.
///
/// Starting a new invocation supersedes the previous one: the older run keeps
/// going and its history entry still records the real outcome, but only the
/// newest run drives `loading`, `result`, `error` and `elapsed_ms`.
#[derive(Clone)]
pub struct ExecutionTracker {
    invoker: Arc<dyn ToolInvoker>,
    state: Arc<Mutex<TrackerState>>,
}

impl ExecutionTracker {
    pub fn new(invoker: Arc<dyn ToolInvoker>) -> Self {
        Self {
            invoker,
            state: Arc::new(Mutex::new(TrackerState::default())),
        }
    }

    pub async fn invoke(&self, tool: &str, params: ToolInput) -> Result<ToolInvocationResult> {
        let entry_id = uuid::Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let started = Instant::now();
        {
            let mut state = self.state.lock();
            if let Some(previous) = state.active.take() {
                previous.ticker.abort();
            }
            state.history.push_front(ExecutionHistoryEntry {
                id: entry_id.clone(),
                tool_name: tool.to_string(),
                params: params.clone(),
                started_at: Utc::now(),
                completed_at: None,
                elapsed_ms: None,
                result: None,
                error: None,
                status: ExecutionStatus::Running,
            });
            state.history.truncate(HISTORY_LIMIT);
            state.loading = true;
            state.result = None;
            state.error = None;
            state.elapsed_ms = 0;
            let ticker = tokio::spawn(tick(Arc::downgrade(&self.state), entry_id.clone(), started));
            state.active = Some(ActiveRun {
                entry_id: entry_id.clone(),
                started,
                cancel: cancel.clone(),
                ticker,
            });
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Aborted.into()),
            outcome = self.invoker.invoke(tool, params) => outcome,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.lock();
        let still_running = state
            .history
            .iter()
            .find(|entry| entry.id == entry_id)
            .map(|entry| entry.status == ExecutionStatus::Running)
            .unwrap_or(true);
        if !still_running {
            // Aborted between completion and this lock; the result is dropped.
            return Err(ClientError::Aborted.into());
        }

        let (result, error) = match &outcome {
            Ok(result) if result.is_error() => (Some(result.clone()), Some(result.output.clone())),
            Ok(result) => (Some(result.clone()), None),
            Err(e) => (None, Some(e.to_string())),
        };
        if let Some(entry) = state.entry_mut(&entry_id) {
            entry.finish(elapsed_ms, result.clone(), error.clone());
        }
        if state.is_active(&entry_id) {
            if let Some(run) = state.active.take() {
                run.ticker.abort();
            }
            state.loading = false;
            state.result = result;
            state.error = error;
            state.elapsed_ms = elapsed_ms;
        } else {
            tracing::debug!("Discarding superseded result for '{}'", tool);
        }
        drop(state);

        Ok(outcome?)
    }

    /// Stops the foreground run. Its entry is closed as an error and any
    /// result that arrives later is discarded.
    pub fn abort(&self) -> bool {
        let mut state = self.state.lock();
        let Some(run) = state.active.take() else {
            return false;
        };
        run.ticker.abort();
        run.cancel.cancel();
        let elapsed_ms = run.started.elapsed().as_millis() as u64;
        if let Some(entry) = state.entry_mut(&run.entry_id) {
            entry.finish(elapsed_ms, None, Some(ABORTED.to_string()));
        }
        state.loading = false;
        state.error = Some(ABORTED.to_string());
        state.elapsed_ms = elapsed_ms;
        true
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        let state = self.state.lock();
        ExecutionSnapshot {
            loading: state.loading,
            result: state.result.clone(),
            error: state.error.clone(),
            elapsed_ms: state.elapsed_ms,
            history: state.history.iter().cloned().collect(),
        }
    }

    pub fn clear_history(&self) {
        let mut state = self.state.lock();
        let active = state.active.as_ref().map(|run| run.entry_id.clone());
        state
            .history
            .retain(|entry| Some(&entry.id) == active.as_ref());
    }
}

async fn tick(state: Weak<Mutex<TrackerState>>, entry_id: String, started: Instant) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        let Some(state) = state.upgrade() else {
            return;
        };
        let mut state = state.lock();
        if !state.is_active(&entry_id) {
            return;
        }
        state.elapsed_ms = started.elapsed().as_millis() as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    #[derive(Default)]
    struct DelayedInvoker {
        delays: HashMap<&'static str, Duration>,
        failing: Option<&'static str>,
    }

    #[async_trait]
    impl ToolInvoker for DelayedInvoker {
        async fn invoke(&self, tool: &str, _input: ToolInput) -> matrx_client::Result<ToolInvocationResult> {
            if let Some(delay) = self.delays.get(tool) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing == Some(tool) {
                return Ok(ToolInvocationResult::error("boom"));
            }
            Ok(ToolInvocationResult::success(tool))
        }
    }

    fn tracker(delays: &[(&'static str, u64)]) -> ExecutionTracker {
        ExecutionTracker::new(Arc::new(DelayedInvoker {
            delays: delays
                .iter()
                .map(|(tool, ms)| (*tool, Duration::from_millis(*ms)))
                .collect(),
            failing: None,
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn history_is_bounded_and_most_recent_first() {
        let tracker = tracker(&[]);
        for i in 0..55 {
            let tool = format!("tool-{}", i);
            tracker.invoke(&tool, ToolInput::new()).await.unwrap();
        }
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.history.len(), HISTORY_LIMIT);
        assert_eq!(snapshot.history[0].tool_name, "tool-54");
        assert_eq!(snapshot.history[49].tool_name, "tool-5");
        assert!(snapshot
            .history
            .iter()
            .all(|entry| entry.status == ExecutionStatus::Success));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_updates_elapsed_while_running() {
        let tracker = tracker(&[("Bash", 350)]);
        let running = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.invoke("Bash", ToolInput::new()).await }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        let snapshot = tracker.snapshot();
        assert!(snapshot.loading);
        assert!(snapshot.elapsed_ms >= 200, "elapsed {}", snapshot.elapsed_ms);
        assert_eq!(snapshot.history[0].status, ExecutionStatus::Running);

        running.await.unwrap().unwrap();
        let snapshot = tracker.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.elapsed_ms >= 350);
        assert_eq!(snapshot.history[0].status, ExecutionStatus::Success);
        assert_eq!(snapshot.history[0].elapsed_ms, Some(snapshot.elapsed_ms));
        assert_eq!(snapshot.result.unwrap().output, "Bash");
    }

    #[tokio::test(start_paused = true)]
    async fn abort_marks_entry_and_discards_late_result() {
        let tracker = tracker(&[("Scrape", 1000)]);
        let running = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.invoke("Scrape", ToolInput::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(tracker.abort());
        assert!(!tracker.abort());
        let outcome = running.await.unwrap();
        assert!(outcome.unwrap_err().is_aborted());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let snapshot = tracker.snapshot();
        assert!(!snapshot.loading);
        assert!(snapshot.result.is_none());
        assert_eq!(snapshot.error.as_deref(), Some("aborted"));
        let entry = &snapshot.history[0];
        assert_eq!(entry.status, ExecutionStatus::Error);
        assert_eq!(entry.error.as_deref(), Some("aborted"));
        assert!(entry.result.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_run_supersedes_late_result() {
        let tracker = tracker(&[("slow", 500), ("fast", 100)]);
        let slow = tokio::spawn({
            let tracker = tracker.clone();
            async move { tracker.invoke("slow", ToolInput::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        tracker.invoke("fast", ToolInput::new()).await.unwrap();
        slow.await.unwrap().unwrap();

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.result.unwrap().output, "fast");
        assert!(!snapshot.loading);
        assert_eq!(snapshot.history[0].tool_name, "fast");
        assert_eq!(snapshot.history[1].tool_name, "slow");
        assert_eq!(snapshot.history[1].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn tool_level_error_marks_entry_failed() {
        let tracker = ExecutionTracker::new(Arc::new(DelayedInvoker {
            failing: Some("Bash"),
            ..DelayedInvoker::default()
        }));
        let result = tracker.invoke("Bash", ToolInput::new()).await.unwrap();
        assert!(result.is_error());

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("boom"));
        assert_eq!(snapshot.history[0].status, ExecutionStatus::Error);

        tracker.clear_history();
        assert!(tracker.snapshot().history.is_empty());
    }
}
