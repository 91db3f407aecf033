//! Hierarchical multi-agent LLM orchestrator.
//!
//! A tree-shaped team of LLM-backed workers — one global supervisor, several
//! team supervisors, multiple workers per team — driven to completion
//! against a user-supplied task. See the crate's `SPEC_FULL.md` for the full
//! contract; this module just wires the pieces together.
//!
//! ```text
//! HierarchyConfig -> TopologyBuilder -> Topology
//!                                          |
//!                                          v
//!                        RunRegistry <- Scheduler -> EventBus
//! ```

#[cfg(feature = "http-server")]
pub mod api;
pub mod error;
pub mod event;
pub mod hierarchy;
pub mod model;
pub mod run;
pub mod scheduler;
pub mod settings;
pub mod supervisor;
pub mod topology;
pub mod worker;

pub use error::{ModelError, OrchestratorError};
pub use event::{Event, EventBus, EventKind};
pub use hierarchy::{ExecutionMode, HierarchyConfig, TeamConfig, WorkerConfig};
pub use model::{InvokeParams, Message, ModelClient, Role, TokenUsage};
pub use run::{Run, RunRegistry, RunStatus};
pub use scheduler::{CancellationToken, Scheduler};
pub use supervisor::{Candidate, Selection, Supervisor};
pub use topology::{Topology, TopologyBuilder};
pub use worker::{Worker, WorkerOutput};
