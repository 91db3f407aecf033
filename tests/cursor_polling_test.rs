//! Cursor-based polling contract (spec §8 scenario 6): concatenating
//! successive `since(cursor)` deltas must reconstruct the canonical per-run
//! log exactly, and polling again after the terminal event must return an
//! empty delta with `terminal = true`.

use async_trait::async_trait;
use hierarchical_agents::{
    CancellationToken, Event, EventKind, ExecutionMode, HierarchyConfig, InvokeParams, ModelClient,
    ModelError, RunRegistry, RunStatus, Scheduler, TeamConfig, TokenUsage, TopologyBuilder, WorkerConfig,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Like `MockModelClient`, but each call sleeps briefly first so a sequential
/// run takes long enough for this test to observe more than one poll.
struct DelayedClient {
    responses: AsyncMutex<VecDeque<String>>,
    delay: Duration,
}

impl DelayedClient {
    fn new(responses: impl IntoIterator<Item = &'static str>, delay: Duration) -> Self {
        Self { responses: AsyncMutex::new(responses.into_iter().map(String::from).collect()), delay }
    }
}

#[async_trait]
impl ModelClient for DelayedClient {
    fn name(&self) -> &str {
        "delayed"
    }

    async fn invoke(&self, _prompt: &str, _params: &InvokeParams) -> Result<(String, TokenUsage), ModelError> {
        tokio::time::sleep(self.delay).await;
        let mut queue = self.responses.lock().await;
        match queue.pop_front() {
            Some(text) => Ok((text, TokenUsage::default())),
            None => Err(ModelError::Permanent("response queue exhausted".to_string())),
        }
    }
}

fn two_team_sequential_config() -> HierarchyConfig {
    HierarchyConfig {
        global_prompt: "G".to_string(),
        task: "hello".to_string(),
        enable_context_sharing: false,
        execution_mode: ExecutionMode::Sequential,
        teams: vec![
            TeamConfig {
                name: "T1".to_string(),
                supervisor_prompt: "S1".to_string(),
                id: None,
                prevent_duplicate: true,
                share_context: false,
                max_iterations: 8,
                workers: vec![WorkerConfig {
                    name: "W1".to_string(),
                    role: "r".to_string(),
                    system_prompt: "WS1".to_string(),
                    id: None,
                    tools: vec![],
                    temperature: 0.7,
                    max_tokens: 2048,
                }],
            },
            TeamConfig {
                name: "T2".to_string(),
                supervisor_prompt: "S2".to_string(),
                id: None,
                prevent_duplicate: true,
                share_context: false,
                max_iterations: 8,
                workers: vec![WorkerConfig {
                    name: "W2".to_string(),
                    role: "r".to_string(),
                    system_prompt: "WS2".to_string(),
                    id: None,
                    tools: vec![],
                    temperature: 0.7,
                    max_tokens: 2048,
                }],
            },
        ],
    }
}

#[tokio::test]
async fn concatenated_deltas_reconstruct_the_canonical_log() {
    let topology = Arc::new(TopologyBuilder::build(&two_team_sequential_config()).unwrap());
    let registry = RunRegistry::new();
    let run = registry.create(None, topology, "hello".to_string());

    // Global team selection x2, worker selection x2, worker invocation x2,
    // global synthesis x1 — one response per model call the sequential path
    // makes for this topology.
    let client = Arc::new(DelayedClient::new(
        ["T1", "W1", "out1", "T2", "W2", "out2", "final"],
        Duration::from_millis(40),
    ));

    let run_for_task = run.clone();
    let handle = tokio::spawn(async move {
        let scheduler = Scheduler::new(client, 8);
        scheduler.execute(run_for_task, CancellationToken::new()).await
    });

    let mut cursor = 0u64;
    let mut polled: Vec<Event> = Vec::new();
    let mut terminal = false;
    let mut polls = 0;
    while !terminal {
        tokio::time::sleep(Duration::from_millis(15)).await;
        let (events, new_cursor, is_terminal) = run.read().unwrap().events.since(cursor);
        polled.extend(events);
        cursor = new_cursor;
        terminal = is_terminal;
        polls += 1;
        assert!(polls < 1000, "polling loop did not observe a terminal event in time");
    }

    handle.await.unwrap().unwrap();

    let canonical = run.read().unwrap().events.since(0).0;
    let polled_ids: Vec<u64> = polled.iter().map(|e| e.event_id).collect();
    let canonical_ids: Vec<u64> = canonical.iter().map(|e| e.event_id).collect();
    assert_eq!(polled_ids, canonical_ids);

    let polled_kinds: Vec<EventKind> = polled.iter().map(|e| e.event_type).collect();
    let canonical_kinds: Vec<EventKind> = canonical.iter().map(|e| e.event_type).collect();
    assert_eq!(polled_kinds, canonical_kinds);
    assert_eq!(canonical.last().unwrap().event_type, EventKind::ExecutionCompleted);

    assert_eq!(run.read().unwrap().status, RunStatus::Completed);

    // Polling again past the terminal event yields nothing further.
    let (further, _cursor, still_terminal) = run.read().unwrap().events.since(cursor);
    assert!(further.is_empty());
    assert!(still_terminal);
}
