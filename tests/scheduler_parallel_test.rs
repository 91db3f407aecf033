//! End-to-end scheduler scenarios, parallel execution mode (spec §8
//! scenarios 2, 4).
//!
//! Two teams run concurrently against one shared `ModelClient`, so these
//! tests can't rely on a fixed call order the way the sequential tests do —
//! instead the stub client below answers purely from each call's own
//! `system` prompt (each supervisor/worker carries a distinct one), which is
//! race-proof regardless of which team's task the executor happens to poll
//! first.

use async_trait::async_trait;
use hierarchical_agents::{
    CancellationToken, Event, EventKind, ExecutionMode, HierarchyConfig, InvokeParams, ModelClient,
    ModelError, RunRegistry, RunStatus, Scheduler, TeamConfig, TokenUsage, TopologyBuilder, WorkerConfig,
};
use std::sync::Arc;

struct SystemPromptRouter {
    fail_on_system: Option<&'static str>,
}

#[async_trait]
impl ModelClient for SystemPromptRouter {
    fn name(&self) -> &str {
        "system-prompt-router"
    }

    async fn invoke(&self, _prompt: &str, params: &InvokeParams) -> Result<(String, TokenUsage), ModelError> {
        let system = params.system.as_deref().unwrap_or("");
        if self.fail_on_system == Some(system) {
            return Err(ModelError::Permanent("bad auth".to_string()));
        }
        let text = match system {
            "S1" => "W1",
            "S2" => "W2",
            "WS1" => "out1",
            "WS2" => "out2",
            "G" => "final",
            other => panic!("unexpected system prompt '{}'", other),
        };
        Ok((text.to_string(), TokenUsage::default()))
    }
}

fn worker(name: &str, system_prompt: &str) -> WorkerConfig {
    WorkerConfig {
        name: name.to_string(),
        role: "r".to_string(),
        system_prompt: system_prompt.to_string(),
        id: None,
        tools: vec![],
        temperature: 0.7,
        max_tokens: 2048,
    }
}

fn two_team_config() -> HierarchyConfig {
    HierarchyConfig {
        global_prompt: "G".to_string(),
        task: "hello".to_string(),
        enable_context_sharing: false,
        execution_mode: ExecutionMode::Parallel,
        teams: vec![
            TeamConfig {
                name: "T1".to_string(),
                supervisor_prompt: "S1".to_string(),
                id: None,
                prevent_duplicate: true,
                share_context: false,
                max_iterations: 8,
                workers: vec![worker("W1", "WS1")],
            },
            TeamConfig {
                name: "T2".to_string(),
                supervisor_prompt: "S2".to_string(),
                id: None,
                prevent_duplicate: true,
                share_context: false,
                max_iterations: 8,
                workers: vec![worker("W2", "WS2")],
            },
        ],
    }
}

fn position(events: &[Event], kind: EventKind, team_id: &str) -> usize {
    events
        .iter()
        .position(|e| {
            e.event_type == kind && e.topology_metadata.as_ref().and_then(|m| m.team_id.as_deref()) == Some(team_id)
        })
        .unwrap_or_else(|| panic!("no {:?} event found for team {}", kind, team_id))
}

/// Scenario 2: per-team ordering (`team_started < worker_* < team_completed`)
/// holds for each team independently; no ordering is required between teams
/// (§8 invariant 6).
#[tokio::test]
async fn parallel_two_team_keeps_per_team_ordering() {
    let topology = Arc::new(TopologyBuilder::build(&two_team_config()).unwrap());
    let registry = RunRegistry::new();
    let run = registry.create(None, topology, "hello".to_string());

    let client = Arc::new(SystemPromptRouter { fail_on_system: None });
    let scheduler = Scheduler::new(client, 8);
    scheduler.execute(run.clone(), CancellationToken::new()).await.unwrap();

    let run = run.read().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.as_deref(), Some("final"));

    let (events, _cursor, terminal) = run.events.since(0);
    assert!(terminal);
    assert_eq!(events.first().unwrap().event_type, EventKind::TopologyCreated);
    assert_eq!(events.last().unwrap().event_type, EventKind::ExecutionCompleted);

    for team in run.topology.teams.iter() {
        let team_id = &team.team_id;
        let started = position(&events, EventKind::TeamStarted, team_id);
        let worker_started = position(&events, EventKind::WorkerStarted, team_id);
        let worker_completed = position(&events, EventKind::WorkerCompleted, team_id);
        let completed = position(&events, EventKind::TeamCompleted, team_id);
        assert!(started < worker_started);
        assert!(worker_started < worker_completed);
        assert!(worker_completed < completed);
    }
}

/// Scenario 4: one of two parallel teams fails permanently; the run still
/// completes with a synthesis of the surviving team, and an `error` event is
/// present for the failed team.
#[tokio::test]
async fn one_team_permanent_failure_does_not_fail_the_run() {
    let topology = Arc::new(TopologyBuilder::build(&two_team_config()).unwrap());
    let registry = RunRegistry::new();
    let run = registry.create(None, topology, "hello".to_string());

    let client = Arc::new(SystemPromptRouter { fail_on_system: Some("WS2") });
    let scheduler = Scheduler::new(client, 8);
    let outcome = scheduler.execute(run.clone(), CancellationToken::new()).await;
    assert!(outcome.is_ok());

    let run = run.read().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.result.as_deref(), Some("final"));

    let (events, _cursor, _terminal) = run.events.since(0);
    assert!(events.iter().any(|e| e.event_type == EventKind::Error));

    let team_completed: Vec<&Event> = events.iter().filter(|e| e.event_type == EventKind::TeamCompleted).collect();
    assert_eq!(team_completed.len(), 2);
    assert!(team_completed.iter().any(|e| e.data.get("status").and_then(|v| v.as_str()) == Some("failed")));
    assert!(team_completed.iter().any(|e| e.data.get("status").and_then(|v| v.as_str()) == Some("done")));
}
