//! Drives a [`Topology`] to completion against a task (§4.5).
//!
//! The team loop below generalizes this codebase's existing layered
//! parallel-fan-out pattern (`tokio::spawn` per concurrent unit, collected
//! with sequential `.await`s) from a flat list of agents to a tree of teams
//! and workers, adding the retry/timeout/cancellation machinery a
//! long-running hierarchical run needs that a single synthesis pass did not.

use crate::error::{ModelError, OrchestratorError, TimeoutScope};
use crate::event::{EventKind, TopologyMetadata};
use crate::model::{InvokeParams, ModelClient};
use crate::run::{Run, RunStatus};
use crate::supervisor::{Candidate, Supervisor};
use crate::topology::{TeamNode, Topology};
use crate::worker::Worker;
use rand::Rng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TEAM_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(1800);

const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];
const MAX_ATTEMPTS: usize = 3;

/// The name a supervisor may select instead of a real team/worker to signal
/// "stop here" (§4.5).
const FINISH_SENTINEL: &str = "FINISH";

/// Cooperative cancellation flag shared between a run's scheduler task and
/// whoever started it. Checked at loop boundaries only — in-flight model
/// calls are allowed to finish or time out on their own (§5).
#[derive(Clone)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of running a single team to completion.
struct TeamOutcome {
    team_id: String,
    succeeded: bool,
    output: Option<String>,
}

/// Drives one [`Topology`] through the scheduling state machine for a given
/// task (§4.5). Stateless itself — all mutable per-run state lives in the
/// `Run` passed to [`Scheduler::execute`].
pub struct Scheduler {
    client: Arc<dyn ModelClient>,
    model_semaphore: Arc<Semaphore>,
    worker_timeout: Duration,
    team_timeout: Duration,
    run_timeout: Duration,
    /// When set, error events carry an extra `details` string (§7 "in DEBUG
    /// mode, a stack trace / details string"). Rust has no portable runtime
    /// stack trace to attach, so `details` instead carries the full `Debug`
    /// formatting of the underlying error — still strictly more than the
    /// user-facing `message`, and never shown to clients outside DEBUG mode.
    debug: bool,
}

impl Scheduler {
    pub fn new(client: Arc<dyn ModelClient>, max_concurrent_model_calls: usize) -> Self {
        Self {
            client,
            model_semaphore: Arc::new(Semaphore::new(max_concurrent_model_calls.max(1))),
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
            team_timeout: DEFAULT_TEAM_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            debug: false,
        }
    }

    pub fn with_timeouts(mut self, worker: Duration, team: Duration, run: Duration) -> Self {
        self.worker_timeout = worker;
        self.team_timeout = team;
        self.run_timeout = run;
        self
    }

    /// Enable DEBUG-mode error events (§6 `DEBUG` env var, §7).
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Attach a `details` field to an error payload when DEBUG mode is on.
    fn debug_details(&self, value: &mut serde_json::Value, details: impl std::fmt::Debug) {
        if self.debug {
            if let serde_json::Value::Object(map) = value {
                map.insert("details".to_string(), serde_json::json!(format!("{:?}", details)));
            }
        }
    }

    /// Drive `run` to a terminal state, appending events to its `EventBus`
    /// and flipping `Run.status` along the way.
    pub async fn execute(&self, run: Arc<RwLock<Run>>, cancellation: CancellationToken) -> Result<(), OrchestratorError> {
        let (topology, task, events, run_id) = {
            let run = run.read().unwrap();
            (run.topology.clone(), run.task.clone(), run.events.clone(), run.run_id.clone())
        };

        events.append(EventKind::TopologyCreated, topology_summary(&topology), None);
        {
            let mut run = run.write().unwrap();
            run.status = RunStatus::Running;
        }
        log::info!("run {} started: {} team(s), mode={:?}", run_id, topology.teams.len(), topology.execution_mode);
        events.append(EventKind::ExecutionStarted, serde_json::json!({ "task": task }), None);

        let outcome = tokio::time::timeout(self.run_timeout, self.drive(&topology, &task, &events, &cancellation)).await;

        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => {
                log::warn!("run {} exceeded its {:?} timeout", run_id, self.run_timeout);
                let mut data = serde_json::json!({ "kind": "timeout", "scope": "run" });
                self.debug_details(&mut data, format!("run exceeded {:?}", self.run_timeout));
                events.append_terminal(EventKind::Error, data, None);
                Err(OrchestratorError::Timeout { scope: TimeoutScope::Run })
            }
        };

        let mut run = run.write().unwrap();
        match &result {
            Ok(final_text) => {
                run.result = Some(final_text.clone());
                run.status = RunStatus::Completed;
                log::info!("run {} completed", run_id);
                events.append_terminal(EventKind::ExecutionCompleted, serde_json::json!({ "result": final_text }), None);
            }
            Err(err) => {
                run.error = Some(err.to_string());
                run.status = RunStatus::Failed;
                log::warn!("run {} failed: {}", run_id, err);
                if !matches!(err, OrchestratorError::Timeout { .. }) {
                    let kind = if matches!(err, OrchestratorError::Cancelled) { "cancelled" } else { "failure" };
                    let mut data = serde_json::json!({ "kind": kind, "message": err.to_string() });
                    self.debug_details(&mut data, err);
                    events.append_terminal(EventKind::Error, data, None);
                }
            }
        }
        run.terminated_at = Some(chrono::Utc::now());

        result.map(|_| ())
    }

    async fn drive(
        &self,
        topology: &Topology,
        task: &str,
        events: &Arc<crate::event::EventBus>,
        cancellation: &CancellationToken,
    ) -> Result<String, OrchestratorError> {
        let outcomes = match topology.execution_mode {
            crate::hierarchy::ExecutionMode::Sequential => self.run_sequential(topology, task, events, cancellation).await?,
            crate::hierarchy::ExecutionMode::Parallel => self.run_parallel(topology, task, events, cancellation).await?,
        };

        if cancellation.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let successful: Vec<&TeamOutcome> = outcomes.iter().filter(|o| o.succeeded).collect();
        if successful.is_empty() {
            return Err(OrchestratorError::Internal("no team completed successfully".to_string()));
        }

        self.synthesize(topology, task, &outcomes).await
    }

    async fn run_sequential(
        &self,
        topology: &Topology,
        task: &str,
        events: &Arc<crate::event::EventBus>,
        cancellation: &CancellationToken,
    ) -> Result<Vec<TeamOutcome>, OrchestratorError> {
        let global_supervisor = Supervisor::new(
            topology.global_supervisor_id.clone(),
            topology.global_prompt.clone(),
            self.client.clone(),
        );

        let mut remaining: Vec<&TeamNode> = topology.teams.iter().collect();
        let mut outcomes = Vec::new();
        // §4.5 step 2 "global task ⊕ optional shared context": accumulates
        // completed teams' outputs, fed forward to every team that runs after
        // them, when `enable_context_sharing` is set.
        let mut shared_context = String::new();

        while !remaining.is_empty() {
            if cancellation.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            let mut candidates: Vec<Candidate> = remaining.iter().map(|t| Candidate::new(t.team_name.clone())).collect();
            candidates.push(Candidate::new(FINISH_SENTINEL));

            let selection = global_supervisor.select_one_structured(task, &candidates).await?;
            if selection.fell_back {
                events.append(
                    EventKind::SupervisorFallback,
                    serde_json::json!({ "supervisor_id": topology.global_supervisor_id, "selected": selection.name }),
                    None,
                );
            }
            if selection.name == FINISH_SENTINEL {
                break;
            }

            let index = remaining.iter().position(|t| t.team_name == selection.name);
            let team = match index {
                Some(i) => remaining.remove(i),
                None => break,
            };

            let team_task = if topology.enable_context_sharing && !shared_context.is_empty() {
                format!("{}\n\n{}", task, shared_context)
            } else {
                task.to_string()
            };

            let outcome =
                tokio::time::timeout(self.team_timeout, self.run_team(team, &team_task, events, cancellation)).await;
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::warn!("team {} exceeded its {:?} timeout", team.team_id, self.team_timeout);
                    let mut data = serde_json::json!({ "kind": "timeout", "scope": "team" });
                    self.debug_details(&mut data, format!("team '{}' exceeded {:?}", team.team_id, self.team_timeout));
                    events.append(EventKind::Error, data, Some(TopologyMetadata::team(team.team_id.clone())));
                    TeamOutcome { team_id: team.team_id.clone(), succeeded: false, output: None }
                }
            };

            if topology.enable_context_sharing {
                if let Some(output) = &outcome.output {
                    shared_context = format!("{}\n\n[{}]: {}", shared_context, team.team_name, output).trim().to_string();
                }
            }
            outcomes.push(outcome);
        }

        for team in remaining {
            outcomes.push(TeamOutcome { team_id: team.team_id.clone(), succeeded: false, output: None });
        }

        Ok(outcomes)
    }

    async fn run_parallel(
        &self,
        topology: &Topology,
        task: &str,
        events: &Arc<crate::event::EventBus>,
        cancellation: &CancellationToken,
    ) -> Result<Vec<TeamOutcome>, OrchestratorError> {
        let mut handles = Vec::with_capacity(topology.teams.len());
        for team in &topology.teams {
            let team = team.clone();
            let task = task.to_string();
            let client = self.client.clone();
            let semaphore = self.model_semaphore.clone();
            let team_timeout = self.team_timeout;
            let worker_timeout = self.worker_timeout;
            let run_timeout = self.run_timeout;
            let events = events.clone();
            let cancellation = cancellation.clone();
            let debug = self.debug;

            handles.push(tokio::spawn(async move {
                let scheduler = Self { client, model_semaphore: semaphore, worker_timeout, team_timeout, run_timeout, debug };
                let run = tokio::time::timeout(team_timeout, scheduler.run_team(&team, &task, &events, &cancellation)).await;
                match run {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        log::warn!("team {} exceeded its {:?} timeout", team.team_id, team_timeout);
                        let mut data = serde_json::json!({ "kind": "timeout", "scope": "team" });
                        scheduler.debug_details(&mut data, format!("team '{}' exceeded {:?}", team.team_id, team_timeout));
                        events.append(EventKind::Error, data, Some(TopologyMetadata::team(team.team_id.clone())));
                        TeamOutcome { team_id: team.team_id.clone(), succeeded: false, output: None }
                    }
                }
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    return Err(OrchestratorError::Internal(format!("team task panicked: {}", join_err)));
                }
            }
        }
        Ok(outcomes)
    }

    async fn run_team(
        &self,
        team: &TeamNode,
        task: &str,
        events: &Arc<crate::event::EventBus>,
        cancellation: &CancellationToken,
    ) -> TeamOutcome {
        log::info!("team {} ({}) started", team.team_id, team.team_name);
        events.append(EventKind::TeamStarted, serde_json::json!({}), Some(TopologyMetadata::team(team.team_id.clone())));

        let supervisor = Supervisor::new(team.supervisor_id.clone(), team.supervisor_prompt.clone(), self.client.clone());
        let mut excluded: HashSet<String> = HashSet::new();
        let mut context = String::new();
        let mut any_success = false;

        for _ in 0..team.max_iterations {
            if cancellation.is_cancelled() {
                break;
            }

            let eligible: Vec<&crate::topology::WorkerNode> =
                team.workers.iter().filter(|w| !excluded.contains(&w.worker_id)).collect();
            if eligible.is_empty() {
                break;
            }

            let mut candidates: Vec<Candidate> = eligible.iter().map(|w| Candidate::new(w.worker_name.clone())).collect();
            candidates.push(Candidate::new(FINISH_SENTINEL));

            let team_task = if context.is_empty() { task.to_string() } else { format!("{}\n\n{}", task, context) };
            let selection = match supervisor.select_one_structured(&team_task, &candidates).await {
                Ok(selection) => selection,
                Err(_) => break,
            };
            if selection.fell_back {
                log::warn!(
                    "supervisor {} could not resolve a selection, falling back to '{}'",
                    team.supervisor_id,
                    selection.name
                );
                events.append(
                    EventKind::SupervisorFallback,
                    serde_json::json!({ "supervisor_id": team.supervisor_id, "selected": selection.name }),
                    Some(TopologyMetadata::team(team.team_id.clone())),
                );
            }
            if selection.name == FINISH_SENTINEL {
                break;
            }

            let worker_node = match eligible.iter().find(|w| w.worker_name == selection.name) {
                Some(w) => *w,
                None => break,
            };

            log::info!("worker {} ({}) started", worker_node.worker_id, worker_node.worker_name);
            events.append(
                EventKind::WorkerStarted,
                serde_json::json!({ "worker_name": worker_node.worker_name }),
                Some(TopologyMetadata::worker(team.team_id.clone(), worker_node.worker_id.clone())),
            );

            let worker = Worker::new(
                worker_node.worker_id.clone(),
                worker_node.worker_name.clone(),
                worker_node.role.clone(),
                worker_node.system_prompt.clone(),
                worker_node.tools.clone(),
                worker_node.temperature,
                worker_node.max_tokens,
                self.client.clone(),
            );

            let shared_context = if context.is_empty() { None } else { Some(context.as_str()) };
            let outcome = self.retry_worker(&worker, &team_task, shared_context).await;

            if team.prevent_duplicate {
                excluded.insert(worker_node.worker_id.clone());
            }

            match outcome {
                Ok(output) => {
                    log::info!("worker {} ({}) completed", worker_node.worker_id, worker_node.worker_name);
                    events.append(
                        EventKind::WorkerCompleted,
                        serde_json::json!({ "worker_name": worker_node.worker_name, "output": output.text }),
                        Some(TopologyMetadata::worker(team.team_id.clone(), worker_node.worker_id.clone())),
                    );
                    context = format!("{}\n\n[{}]: {}", context, worker_node.worker_name, output.text).trim().to_string();
                    any_success = true;
                }
                Err(err) => {
                    log::warn!("worker {} ({}) failed: {}", worker_node.worker_id, worker_node.worker_name, err);
                    let mut data = serde_json::json!({ "kind": "worker_failed", "message": err.message() });
                    self.debug_details(&mut data, &err);
                    events.append(
                        EventKind::Error,
                        data,
                        Some(TopologyMetadata::worker(team.team_id.clone(), worker_node.worker_id.clone())),
                    );
                    excluded.insert(worker_node.worker_id.clone());
                }
            }
        }

        let status = if any_success { "done" } else { "failed" };

        // §4.5 step 8: plain concatenation by default, or a supervisor-produced
        // summary when the team opts into `share_context`. A summarization
        // failure falls back to the raw concatenation rather than failing a
        // team that otherwise completed successfully.
        let aggregated = if team.share_context && any_success {
            match supervisor.summarize(task, &context).await {
                Ok(summary) => summary,
                Err(err) => {
                    log::warn!("team {} share_context summary failed, using raw concatenation: {}", team.team_id, err);
                    context
                }
            }
        } else {
            context
        };

        log::info!("team {} ({}) completed with status '{}'", team.team_id, team.team_name, status);
        events.append(
            EventKind::TeamCompleted,
            serde_json::json!({ "status": status, "output": aggregated }),
            Some(TopologyMetadata::team(team.team_id.clone())),
        );

        TeamOutcome {
            team_id: team.team_id.clone(),
            succeeded: any_success,
            output: if any_success { Some(aggregated) } else { None },
        }
    }

    /// Retry a single worker invocation on `Transient` failures with
    /// exponential backoff (1s, 2s, 4s, ±25% jitter, max 3 attempts) wrapped
    /// in a per-worker timeout (§4.5). Workers are stateless, so a retry is
    /// simply calling `execute` again from scratch.
    async fn retry_worker(
        &self,
        worker: &Worker,
        task_text: &str,
        shared_context: Option<&str>,
    ) -> Result<crate::worker::WorkerOutput, ModelError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let _permit = self.model_semaphore.acquire().await.expect("model semaphore closed");
            let call = tokio::time::timeout(self.worker_timeout, worker.execute(task_text, shared_context)).await;
            drop(_permit);

            let result = match call {
                Ok(result) => result,
                Err(_) => Err(ModelError::Transient("worker invocation timed out".to_string())),
            };

            match result {
                Ok(output) => return Ok(output),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    log::warn!(
                        "worker {} ({}) transient failure on attempt {}/{}, retrying: {}",
                        worker.worker_id, worker.worker_name, attempt, MAX_ATTEMPTS, err
                    );
                    backoff(attempt).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn synthesize(
        &self,
        topology: &Topology,
        task: &str,
        outcomes: &[TeamOutcome],
    ) -> Result<String, OrchestratorError> {
        let summary: String = outcomes
            .iter()
            .filter_map(|o| o.output.as_ref().map(|text| format!("[{}]: {}", o.team_id, text)))
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Original task: {}\n\nTeam results:\n{}\n\nProduce the final synthesized result for the task.",
            task, summary
        );
        let params = InvokeParams { system: Some(topology.global_prompt.clone()), ..InvokeParams::default() };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let _permit = self.model_semaphore.acquire().await.expect("model semaphore closed");
            let result = self.client.invoke(&prompt, &params).await;
            drop(_permit);
            match result {
                Ok((text, _usage)) => return Ok(text),
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    log::warn!("global synthesis transient failure on attempt {}/{}, retrying: {}", attempt, MAX_ATTEMPTS, err);
                    backoff(attempt).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

async fn backoff(attempt: usize) {
    let base = RETRY_DELAYS_MS[(attempt - 1).min(RETRY_DELAYS_MS.len() - 1)];
    let jitter = rand::rng().random_range(-0.25..=0.25_f64);
    let delay_ms = (base as f64 * (1.0 + jitter)).max(0.0) as u64;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

fn topology_summary(topology: &Topology) -> serde_json::Value {
    topology.summary()
}
