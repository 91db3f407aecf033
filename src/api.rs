//! HTTP front door over the orchestration engine (§6).
//!
//! Thin adapter only: every handler here does request parsing, calls into
//! [`crate::topology::TopologyBuilder`], [`crate::run::RunRegistry`], or
//! [`crate::scheduler::Scheduler`], and shapes the result into the
//! `{success, data?, error?}` envelope §6 specifies. No orchestration logic
//! lives in this module. Routing follows the same axum `Router` + `Json`
//! request/response idiom this codebase's existing MCP HTTP adapter uses,
//! generalized from hand-rolled closures to `State`-extractor handlers.

use crate::error::OrchestratorError;
use crate::hierarchy::{ExecutionMode, HierarchyConfig, TeamConfig};
use crate::model::ModelClient;
use crate::run::RunRegistry;
use crate::scheduler::{CancellationToken, Scheduler};
use crate::settings::Settings;
use crate::topology::{Topology, TopologyBuilder};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tower::limit::ConcurrencyLimitLayer;

/// Shared state handed to every route (§5: the only cross-request state is
/// the run registry, the in-memory hierarchy cache, and the resource-bound
/// semaphore — no other process-wide mutable state exists).
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RunRegistry>,
    pub hierarchies: Arc<RwLock<HashMap<String, Arc<Topology>>>>,
    pub client: Arc<dyn ModelClient>,
    pub settings: Arc<Settings>,
    pub run_semaphore: Arc<tokio::sync::Semaphore>,
}

impl AppState {
    pub fn new(client: Arc<dyn ModelClient>, settings: Settings) -> Self {
        let registry = Arc::new(RunRegistry::with_retention(std::time::Duration::from_secs(
            settings.run_retention_seconds,
        )));
        let run_semaphore = Arc::new(tokio::sync::Semaphore::new(settings.max_concurrent_runs.max(1)));
        Self { registry, hierarchies: Arc::new(RwLock::new(HashMap::new())), client, settings: Arc::new(settings), run_semaphore }
    }
}

/// Build the full router (§6 endpoint table). `/execute` and `runs/start`
/// carry a [`ConcurrencyLimitLayer`] bounding `max_concurrent_runs` at the
/// transport boundary; the scheduler's own semaphore (§5) remains the
/// canonical bound honored by callers that drive a `Scheduler` directly.
pub fn router(state: AppState) -> Router {
    let run_starting = Router::new()
        .route("/execute", post(execute_handler))
        .route("/api/executor/v1/runs/start", post(runs_start_handler))
        .layer(ConcurrencyLimitLayer::new(state.settings.max_concurrent_runs.max(1)));

    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .route("/api/executor/v1/hierarchies/create", post(hierarchies_create_handler))
        .route("/api/executor/v1/hierarchies/list", post(hierarchies_list_handler))
        .route("/api/executor/v1/runs/get", post(runs_get_handler))
        .merge(run_starting)
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "hierarchical-agents",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn index_handler() -> Json<Value> {
    Json(json!({
        "service": "hierarchical-agents",
        "endpoints": [
            {"method": "GET", "path": "/health"},
            {"method": "POST", "path": "/execute"},
            {"method": "POST", "path": "/api/executor/v1/hierarchies/create"},
            {"method": "POST", "path": "/api/executor/v1/hierarchies/list"},
            {"method": "POST", "path": "/api/executor/v1/runs/start"},
            {"method": "POST", "path": "/api/executor/v1/runs/get"},
        ],
    }))
}

/// `POST /execute` — build a topology and run it to completion in one
/// request/response cycle (§6, §9 open question: `/execute` runs a normal
/// `Run` to completion and returns its full event log).
async fn execute_handler(State(state): State<AppState>, Json(config): Json<HierarchyConfig>) -> (StatusCode, Json<Value>) {
    if config.task.trim().is_empty() {
        return invalid_config_response(OrchestratorError::InvalidConfig {
            field: "task".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    let topology = match TopologyBuilder::build(&config) {
        Ok(topology) => Arc::new(topology),
        Err(err) => return invalid_config_response(err),
    };

    let run = state.registry.create(None, topology.clone(), config.task.clone());
    let _permit = match state.run_semaphore.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"success": false, "error": "server is shutting down"})),
            )
        }
    };

    let scheduler = Scheduler::new(state.client.clone(), state.settings.max_concurrent_model_calls)
        .with_debug(state.settings.debug);
    let outcome = scheduler.execute(run.clone(), CancellationToken::new()).await;

    let run = run.read().unwrap();
    let (events, _cursor, _terminal) = run.events.since(0);
    let body = json!({
        "success": outcome.is_ok(),
        "data": {
            "run_id": run.run_id,
            "status": run.status,
            "topology": topology.summary(),
            "events": events,
            "result": run.result,
            "error": run.error,
        },
    });
    let status = if outcome.is_ok() { StatusCode::OK } else { StatusCode::INTERNAL_SERVER_ERROR };
    (status, Json(body))
}

/// Request body for `hierarchies/create` — a [`HierarchyConfig`] without a
/// `task`, since a registered hierarchy is reusable across many runs (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateHierarchyRequest {
    pub global_prompt: String,
    pub teams: Vec<TeamConfig>,
    #[serde(default)]
    pub enable_context_sharing: bool,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}

async fn hierarchies_create_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateHierarchyRequest>,
) -> (StatusCode, Json<Value>) {
    let config = HierarchyConfig {
        global_prompt: req.global_prompt,
        teams: req.teams,
        task: String::new(),
        enable_context_sharing: req.enable_context_sharing,
        execution_mode: req.execution_mode,
    };
    let topology = match TopologyBuilder::build(&config) {
        Ok(topology) => topology,
        Err(err) => return invalid_config_response(err),
    };
    let id = topology.hierarchy_id.clone();
    state.hierarchies.write().unwrap().insert(id.clone(), Arc::new(topology));
    (StatusCode::OK, Json(json!({"success": true, "data": {"id": id}})))
}

#[derive(Debug, Deserialize)]
pub struct ListHierarchiesRequest {
    #[serde(default)]
    page: usize,
    #[serde(default = "default_page_size")]
    size: usize,
}

fn default_page_size() -> usize {
    20
}

async fn hierarchies_list_handler(
    State(state): State<AppState>,
    Json(req): Json<ListHierarchiesRequest>,
) -> (StatusCode, Json<Value>) {
    let hierarchies = state.hierarchies.read().unwrap();
    let mut ids: Vec<&String> = hierarchies.keys().collect();
    ids.sort();
    let total = ids.len();
    let items: Vec<Value> = ids
        .into_iter()
        .skip(req.page.saturating_mul(req.size))
        .take(req.size.max(1))
        .map(|id| {
            let topology = &hierarchies[id];
            json!({
                "id": id,
                "global_prompt": topology.global_prompt,
                "team_count": topology.teams.len(),
                "execution_mode": topology.execution_mode,
            })
        })
        .collect();
    (StatusCode::OK, Json(json!({"success": true, "data": {"items": items, "total": total}})))
}

#[derive(Debug, Deserialize)]
pub struct StartRunRequest {
    pub hierarchy_id: String,
    pub task: String,
}

/// `POST runs/start` — registers a `Run` against a previously created
/// hierarchy and drives it in the background; returns the `run_id`
/// immediately (§6, §9 open question).
async fn runs_start_handler(State(state): State<AppState>, Json(req): Json<StartRunRequest>) -> (StatusCode, Json<Value>) {
    if req.task.trim().is_empty() {
        return invalid_config_response(OrchestratorError::InvalidConfig {
            field: "task".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    let topology = {
        let hierarchies = state.hierarchies.read().unwrap();
        match hierarchies.get(&req.hierarchy_id) {
            Some(topology) => topology.clone(),
            None => {
                return (
                    StatusCode::NOT_FOUND,
                    Json(json!({"success": false, "error": format!("unknown hierarchy_id '{}'", req.hierarchy_id)})),
                )
            }
        }
    };

    let run = state.registry.create(Some(req.hierarchy_id.clone()), topology, req.task.clone());
    let run_id = run.read().unwrap().run_id.clone();

    let client = state.client.clone();
    let max_model_calls = state.settings.max_concurrent_model_calls;
    let debug = state.settings.debug;
    let run_semaphore = state.run_semaphore.clone();
    tokio::spawn(async move {
        let _permit = match run_semaphore.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let scheduler = Scheduler::new(client, max_model_calls).with_debug(debug);
        if let Err(err) = scheduler.execute(run, CancellationToken::new()).await {
            log::warn!("run ended in failure: {}", err);
        }
    });

    (StatusCode::OK, Json(json!({"success": true, "data": {"id": run_id}})))
}

#[derive(Debug, Deserialize)]
pub struct GetRunRequest {
    pub id: String,
    #[serde(default)]
    pub since: u64,
}

async fn runs_get_handler(State(state): State<AppState>, Json(req): Json<GetRunRequest>) -> (StatusCode, Json<Value>) {
    let run = match state.registry.get(&req.id) {
        Some(run) => run,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"success": false, "error": format!("unknown run '{}'", req.id)})),
            )
        }
    };
    let run = run.read().unwrap();
    let (events, cursor, terminal) = run.events.since(req.since);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": {
                "status": run.status,
                "events": events,
                "cursor": cursor,
                "terminal": terminal,
                "result": run.result,
                "error": run.error,
            },
        })),
    )
}

fn invalid_config_response(err: OrchestratorError) -> (StatusCode, Json<Value>) {
    match err {
        OrchestratorError::InvalidConfig { field, reason } => {
            (StatusCode::BAD_REQUEST, Json(json!({"success": false, "error": reason, "field": field})))
        }
        other => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"success": false, "error": other.to_string()}))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{HierarchyConfig, TeamConfig, WorkerConfig};
    use crate::model::mock::MockModelClient;

    fn settings() -> Settings {
        Settings { max_concurrent_runs: 4, max_concurrent_model_calls: 4, ..Settings::default() }
    }

    fn sample_config(task: &str) -> HierarchyConfig {
        HierarchyConfig {
            global_prompt: "G".to_string(),
            task: task.to_string(),
            enable_context_sharing: false,
            execution_mode: ExecutionMode::Sequential,
            teams: vec![TeamConfig {
                name: "T1".to_string(),
                supervisor_prompt: "S".to_string(),
                id: None,
                prevent_duplicate: true,
                share_context: false,
                max_iterations: 8,
                workers: vec![WorkerConfig {
                    name: "W1".to_string(),
                    role: "r".to_string(),
                    system_prompt: "p".to_string(),
                    id: None,
                    tools: vec![],
                    temperature: 0.7,
                    max_tokens: 2048,
                }],
            }],
        }
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let body = health_handler().await.0;
        assert_eq!(body["service"], "hierarchical-agents");
    }

    #[tokio::test]
    async fn execute_rejects_empty_task_with_400() {
        let client = Arc::new(MockModelClient::new("mock"));
        let state = AppState::new(client, settings());
        let (status, Json(body)) = execute_handler(State(state), Json(sample_config("   "))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "task");
    }

    #[tokio::test]
    async fn execute_rejects_empty_teams_with_400() {
        let client = Arc::new(MockModelClient::new("mock"));
        let state = AppState::new(client, settings());
        let mut config = sample_config("hello");
        config.teams.clear();
        let (status, Json(body)) = execute_handler(State(state), Json(config)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "At least one team is required");
    }

    #[tokio::test]
    async fn execute_runs_to_completion_and_returns_result() {
        let client = Arc::new(MockModelClient::new("mock").with_responses(["T1", "W1", "out", "final"]));
        let state = AppState::new(client, settings());
        let (status, Json(body)) = execute_handler(State(state), Json(sample_config("hello"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "completed");
        assert_eq!(body["data"]["result"], "final");
    }

    #[tokio::test]
    async fn hierarchies_create_then_list_round_trips() {
        let client = Arc::new(MockModelClient::new("mock"));
        let state = AppState::new(client, settings());
        let create_req = CreateHierarchyRequest {
            global_prompt: "G".to_string(),
            teams: sample_config("ignored").teams,
            enable_context_sharing: false,
            execution_mode: ExecutionMode::Sequential,
        };
        let (status, Json(created)) = hierarchies_create_handler(State(state.clone()), Json(create_req)).await;
        assert_eq!(status, StatusCode::OK);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, Json(listed)) =
            hierarchies_list_handler(State(state), Json(ListHierarchiesRequest { page: 0, size: 20 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["data"]["total"], 1);
        assert_eq!(listed["data"]["items"][0]["id"], id);
    }

    #[tokio::test]
    async fn runs_start_then_get_reaches_terminal_state() {
        let client = Arc::new(MockModelClient::new("mock").with_responses(["T1", "W1", "out", "final"]));
        let state = AppState::new(client, settings());
        let create_req = CreateHierarchyRequest {
            global_prompt: "G".to_string(),
            teams: sample_config("ignored").teams,
            enable_context_sharing: false,
            execution_mode: ExecutionMode::Sequential,
        };
        let (_status, Json(created)) = hierarchies_create_handler(State(state.clone()), Json(create_req)).await;
        let hierarchy_id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, Json(started)) = runs_start_handler(
            State(state.clone()),
            Json(StartRunRequest { hierarchy_id, task: "hello".to_string() }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let run_id = started["data"]["id"].as_str().unwrap().to_string();

        let mut terminal = false;
        for _ in 0..50 {
            let (status, Json(polled)) =
                runs_get_handler(State(state.clone()), Json(GetRunRequest { id: run_id.clone(), since: 0 })).await;
            assert_eq!(status, StatusCode::OK);
            if polled["data"]["terminal"] == true {
                terminal = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(terminal, "run did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn runs_get_unknown_id_is_404() {
        let client = Arc::new(MockModelClient::new("mock"));
        let state = AppState::new(client, settings());
        let (status, _body) =
            runs_get_handler(State(state), Json(GetRunRequest { id: "missing".to_string(), since: 0 })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
