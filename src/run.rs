//! Run lifecycle state machine and registry (§4.7).
//!
//! A [`Run`] transitions `Pending -> Running -> (Completed | Failed)` along
//! one direction only; `RunRegistry` is one of exactly two pieces of shared
//! mutable state the scheduler touches across tasks (the other being
//! [`crate::event::EventBus`]) per the "no global mutable state" design note —
//! both are owned by whoever starts the scheduler, never a process-wide
//! singleton.

use crate::error::OrchestratorError;
use crate::event::EventBus;
use crate::topology::Topology;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Default window a terminated run stays in the registry before the sweeper
/// discards it (§4.7, §6 `RUN_RETENTION_SECONDS`).
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One execution of a [`Topology`] against a task, with its own event log and
/// terminal status (§3).
pub struct Run {
    pub run_id: String,
    pub hierarchy_id: Option<String>,
    pub topology: Arc<Topology>,
    pub task: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub terminated_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub events: Arc<EventBus>,
}

impl Run {
    fn new(run_id: String, hierarchy_id: Option<String>, topology: Arc<Topology>, task: String) -> Self {
        Self {
            run_id,
            hierarchy_id,
            topology,
            task,
            status: RunStatus::Pending,
            created_at: Utc::now(),
            terminated_at: None,
            result: None,
            error: None,
            events: Arc::new(EventBus::new()),
        }
    }

    fn terminated(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}

/// Maps `run_id -> Run` (§4.7). Thread-safe; a background sweeper removes
/// terminated runs past their retention window.
pub struct RunRegistry {
    runs: RwLock<HashMap<String, Arc<RwLock<Run>>>>,
    retention: Duration,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self { runs: RwLock::new(HashMap::new()), retention }
    }

    /// `Create` (§4.7): register a fresh `Pending` run and return a handle to
    /// its shared state.
    pub fn create(&self, hierarchy_id: Option<String>, topology: Arc<Topology>, task: String) -> Arc<RwLock<Run>> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let run = Arc::new(RwLock::new(Run::new(run_id.clone(), hierarchy_id, topology, task)));
        self.runs.write().unwrap().insert(run_id, run.clone());
        run
    }

    /// `Get` (§4.7).
    pub fn get(&self, run_id: &str) -> Option<Arc<RwLock<Run>>> {
        self.runs.read().unwrap().get(run_id).cloned()
    }

    /// `List(page, size)` (§4.7). `page` is zero-indexed.
    pub fn list(&self, page: usize, size: usize) -> (Vec<Arc<RwLock<Run>>>, usize) {
        let runs = self.runs.read().unwrap();
        let mut ids: Vec<&String> = runs.keys().collect();
        ids.sort();
        let total = ids.len();
        let page_items = ids.into_iter().skip(page * size).take(size).map(|id| runs[id].clone()).collect();
        (page_items, total)
    }

    /// `SetStatus` (§4.7). Transitioning into `Running` stamps nothing extra;
    /// transitioning into a terminal status stamps `terminated_at`.
    pub fn set_status(&self, run_id: &str, status: RunStatus) -> Result<(), OrchestratorError> {
        let run = self.get(run_id).ok_or_else(|| OrchestratorError::Internal(format!("unknown run '{}'", run_id)))?;
        let mut run = run.write().unwrap();
        run.status = status;
        if matches!(status, RunStatus::Completed | RunStatus::Failed) {
            run.terminated_at = Some(Utc::now());
        }
        Ok(())
    }

    /// `SetResult` (§4.7): marks the run `Completed` with its final text.
    pub fn set_result(&self, run_id: &str, result: String) -> Result<(), OrchestratorError> {
        let run = self.get(run_id).ok_or_else(|| OrchestratorError::Internal(format!("unknown run '{}'", run_id)))?;
        let mut run = run.write().unwrap();
        run.result = Some(result);
        run.status = RunStatus::Completed;
        run.terminated_at = Some(Utc::now());
        Ok(())
    }

    /// `SetError` (§4.7): marks the run `Failed` with its error message.
    pub fn set_error(&self, run_id: &str, error: String) -> Result<(), OrchestratorError> {
        let run = self.get(run_id).ok_or_else(|| OrchestratorError::Internal(format!("unknown run '{}'", run_id)))?;
        let mut run = run.write().unwrap();
        run.error = Some(error);
        run.status = RunStatus::Failed;
        run.terminated_at = Some(Utc::now());
        Ok(())
    }

    /// Remove terminated runs whose `terminated_at` is older than `retention`.
    /// Called periodically by [`spawn_retention_sweeper`]; exposed directly so
    /// tests can drive it without waiting on a timer.
    pub fn sweep(&self) {
        let now = Utc::now();
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::hours(1));
        let mut runs = self.runs.write().unwrap();
        runs.retain(|_, run| {
            let run = run.read().unwrap();
            match run.terminated_at {
                Some(terminated_at) => now - terminated_at < retention,
                None => true,
            }
        });
    }
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that sweeps `registry` every `interval` (§4.7).
/// The returned handle is aborted when dropped by the caller if it wants to
/// stop the sweeper (e.g. on server shutdown).
pub fn spawn_retention_sweeper(registry: Arc<RunRegistry>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.sweep();
        }
    })
}
