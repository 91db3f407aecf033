//! Declarative configuration types (§3).
//!
//! These are plain data structs — per the "builder vs. config objects" design
//! note, construction logic belongs to [`crate::topology::TopologyBuilder`],
//! not here. `HierarchyConfig` is request-scoped and ephemeral; it is never
//! mutated once handed to the builder.

use serde::{Deserialize, Serialize};

/// How a [`crate::topology::Topology`] drives its teams to completion (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Sequential,
    Parallel,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Sequential
    }
}

/// Configuration for a single leaf worker (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub name: String,
    pub role: String,
    pub system_prompt: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Tool names declared for this worker (e.g. `"calculator"`, `"http_request"`).
    /// Tool *execution* is out of scope (§1 Non-goals) — these names are passed
    /// through to the worker's prompt as declared capabilities only.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2048
}

/// Configuration for one team: a supervisor plus its ordered workers (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub supervisor_prompt: String,
    pub workers: Vec<WorkerConfig>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_true")]
    pub prevent_duplicate: bool,
    #[serde(default)]
    pub share_context: bool,
    /// Cap on worker-selection rounds within this team before the scheduler
    /// stops and settles the team (§4.5 step 7), default 8.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> usize {
    8
}

/// Top-level request: the whole tree plus the task to run against it (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub global_prompt: String,
    pub teams: Vec<TeamConfig>,
    pub task: String,
    #[serde(default)]
    pub enable_context_sharing: bool,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
}
