//! Append-only, cursor-pollable run event log (§4.6).
//!
//! Distinct from this codebase's older push-only `EventHandler` callback
//! trait: clients here poll `Since(cursor)` or subscribe to a live channel,
//! rather than implementing a trait the producer calls back into. Every
//! [`Event`] carries a monotonically increasing `event_id` scoped to its run;
//! ordering is total within one run and undefined across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Default ring-buffer capacity per run before oldest non-terminal events are
/// dropped (§4.6).
const DEFAULT_CAPACITY: usize = 10_000;

/// The closed set of event kinds a run can emit (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TopologyCreated,
    ExecutionStarted,
    TeamStarted,
    TeamCompleted,
    WorkerStarted,
    WorkerCompleted,
    ExecutionCompleted,
    Error,
    SupervisorFallback,
    EventsDropped,
}

impl EventKind {
    /// `true` for the two kinds that *may* end a run's event stream.
    ///
    /// This is necessary but not sufficient: `Error` also covers non-fatal
    /// partial failures (a timed-out team, a failed worker) that the run
    /// survives. Whether a given event is the actual single terminal event
    /// for its run is tracked separately by [`EventBus`] — callers must use
    /// [`EventBus::append_terminal`] rather than inferring terminality from
    /// the event kind alone (§8 invariant 2).
    pub fn can_be_terminal(self) -> bool {
        matches!(self, EventKind::ExecutionCompleted | EventKind::Error)
    }
}

/// Identifies which part of the topology an event concerns, when applicable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
}

impl TopologyMetadata {
    pub fn team(team_id: impl Into<String>) -> Self {
        Self { team_id: Some(team_id.into()), ..Self::default() }
    }

    pub fn worker(team_id: impl Into<String>, worker_id: impl Into<String>) -> Self {
        Self { team_id: Some(team_id.into()), worker_id: Some(worker_id.into()), ..Self::default() }
    }
}

/// A single entry in a run's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventKind,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_metadata: Option<TopologyMetadata>,
}

struct Inner {
    events: VecDeque<Event>,
    next_id: u64,
    dropped: bool,
    capacity: usize,
    /// Set once the run's single terminal event has been appended via
    /// [`EventBus::append_terminal`]. Distinct from `EventKind::Error` on its
    /// own, which also covers non-fatal partial failures that do not end the
    /// run — `Since` reports `terminal` from this flag, not from the kind of
    /// the last event in a given poll's delta.
    terminated: bool,
}

/// Append-only per-run event log (§4.6).
///
/// `Append` never blocks producers on readers: it takes a brief lock to push
/// onto a `VecDeque` and fan out over a broadcast channel, nothing more.
/// Multiple consumers may call `Since` concurrently without interfering with
/// each other or with producers.
pub struct EventBus {
    inner: Mutex<Inner>,
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner { events: VecDeque::new(), next_id: 1, dropped: false, capacity, terminated: false }),
            sender,
        }
    }

    /// `Append(event) -> event_id` (§4.6). For a non-fatal, mid-run event —
    /// including a partial-failure `Error` that the run survives (a failed
    /// worker, a timed-out team in a still-running run).
    pub fn append(
        &self,
        event_type: EventKind,
        data: serde_json::Value,
        topology_metadata: Option<TopologyMetadata>,
    ) -> u64 {
        self.push(event_type, data, topology_metadata, false)
    }

    /// Append the run's single terminal event — `execution_completed`, or the
    /// run-ending `error` (run timeout, cancellation, or unrecoverable
    /// failure). After this call `Since` reports `terminal: true` on every
    /// subsequent poll, including ones whose delta is empty (§8 scenario 6).
    pub fn append_terminal(
        &self,
        event_type: EventKind,
        data: serde_json::Value,
        topology_metadata: Option<TopologyMetadata>,
    ) -> u64 {
        debug_assert!(event_type.can_be_terminal(), "{:?} is never a run-ending event", event_type);
        self.push(event_type, data, topology_metadata, true)
    }

    fn push(
        &self,
        event_type: EventKind,
        data: serde_json::Value,
        topology_metadata: Option<TopologyMetadata>,
        terminal: bool,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let event_id = inner.next_id;
        inner.next_id += 1;
        let event = Event { event_id, timestamp: now(), event_type, data, topology_metadata };

        if inner.events.len() >= inner.capacity {
            Self::drop_oldest(&mut inner);
        }
        inner.events.push_back(event.clone());
        if terminal {
            inner.terminated = true;
        }
        let _ = self.sender.send(event);
        event_id
    }

    /// Evict the oldest event to make room, and record that a drop occurred
    /// so the next poll can surface an `events_dropped` marker. A no-op once
    /// the run has already terminated: nothing is ever appended after
    /// `append_terminal`, so there is nothing left to make room for and the
    /// terminal event itself is never at risk of eviction.
    fn drop_oldest(inner: &mut Inner) {
        if inner.terminated {
            return;
        }
        if inner.events.pop_front().is_some() {
            inner.dropped = true;
        }
    }

    /// `Since(cursor) -> (events[], new_cursor, terminal?)` (§4.6).
    pub fn since(&self, cursor: u64) -> (Vec<Event>, u64, bool) {
        let mut inner = self.inner.lock().unwrap();
        let dropped_marker = if inner.dropped {
            inner.dropped = false;
            let event_id = inner.next_id;
            inner.next_id += 1;
            let marker = Event {
                event_id,
                timestamp: now(),
                event_type: EventKind::EventsDropped,
                data: serde_json::json!({}),
                topology_metadata: None,
            };
            inner.events.push_back(marker.clone());
            let _ = self.sender.send(marker.clone());
            Some(marker)
        } else {
            None
        };

        let mut events: Vec<Event> = inner.events.iter().filter(|e| e.event_id > cursor).cloned().collect();
        if let Some(marker) = dropped_marker {
            if !events.iter().any(|e| e.event_id == marker.event_id) {
                events.push(marker);
            }
        }
        let new_cursor = events.last().map(|e| e.event_id).unwrap_or(cursor);
        let terminal = inner.terminated;
        (events, new_cursor, terminal)
    }

    /// `Subscribe() -> channel/iterator of events until terminal` (§4.6).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> DateTime<Utc> {
    Utc::now()
}
