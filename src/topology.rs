//! Topology validation and deterministic ID assignment (§4.4).
//!
//! `TopologyBuilder` turns an ephemeral [`HierarchyConfig`] into an immutable
//! [`Topology`]. No back-pointers are stored (per the "cyclic graphs" design
//! note): the scheduler looks a worker's team up by ID through
//! `Topology::team_of_worker` rather than a worker holding a reference to its
//! team.

use crate::error::OrchestratorError;
use crate::hierarchy::{HierarchyConfig, TeamConfig, WorkerConfig};
use sha2::{Digest, Sha256};

/// Truncated, deterministic hex fingerprint of `parts` joined by `|`.
///
/// Mirrors the `sha256(...)[..N]` fingerprinting idiom already used elsewhere
/// in this codebase for deriving stable identifiers from identity tuples.
fn short_hash(parts: &[&str], len: usize) -> String {
    let joined = parts.join("|");
    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..len.min(digest.len())].to_string()
}

/// One worker's identity within a materialized [`Topology`].
#[derive(Debug, Clone)]
pub struct WorkerNode {
    pub worker_id: String,
    pub worker_name: String,
    pub role: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// One team's identity and ordered workers within a materialized [`Topology`].
#[derive(Debug, Clone)]
pub struct TeamNode {
    pub team_id: String,
    pub team_name: String,
    pub supervisor_id: String,
    pub supervisor_prompt: String,
    pub workers: Vec<WorkerNode>,
    pub prevent_duplicate: bool,
    pub share_context: bool,
    pub max_iterations: usize,
}

/// The immutable, materialized tree produced by [`TopologyBuilder::build`] (§3).
///
/// Safe to share across the scheduler's concurrent team tasks: nothing here
/// is ever mutated after construction.
#[derive(Debug, Clone)]
pub struct Topology {
    pub hierarchy_id: String,
    pub global_supervisor_id: String,
    pub global_prompt: String,
    pub teams: Vec<TeamNode>,
    pub enable_context_sharing: bool,
    pub execution_mode: crate::hierarchy::ExecutionMode,
}

impl Topology {
    /// Look up the team a worker belongs to by ID, without the worker holding
    /// a back-reference.
    pub fn team_of_worker(&self, worker_id: &str) -> Option<&TeamNode> {
        self.teams.iter().find(|t| t.workers.iter().any(|w| w.worker_id == worker_id))
    }

    pub fn team(&self, team_id: &str) -> Option<&TeamNode> {
        self.teams.iter().find(|t| t.team_id == team_id)
    }

    /// JSON description of the tree, used both for the `topology_created`
    /// event payload (§4.4) and the HTTP API's topology summaries (§6).
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "hierarchy_id": self.hierarchy_id,
            "global_supervisor_id": self.global_supervisor_id,
            "execution_mode": self.execution_mode,
            "teams": self.teams.iter().map(|t| serde_json::json!({
                "team_id": t.team_id,
                "team_name": t.team_name,
                "supervisor_id": t.supervisor_id,
                "workers": t.workers.iter().map(|w| serde_json::json!({
                    "worker_id": w.worker_id,
                    "worker_name": w.worker_name,
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }
}

/// Validates a [`HierarchyConfig`] and assigns stable IDs (§4.4).
pub struct TopologyBuilder;

impl TopologyBuilder {
    /// Validate `config` and materialize a [`Topology`] under a fresh
    /// `hierarchy_id`. Fails with [`OrchestratorError::InvalidConfig`] on the
    /// first violation found; the run never starts.
    pub fn build(config: &HierarchyConfig) -> Result<Topology, OrchestratorError> {
        Self::build_with_hierarchy_id(config, uuid::Uuid::new_v4().to_string())
    }

    /// Same as [`TopologyBuilder::build`] but with a caller-supplied
    /// `hierarchy_id`, used when re-materializing a previously registered
    /// hierarchy for a new run (§6 `hierarchies/create` + `runs/start`).
    pub fn build_with_hierarchy_id(
        config: &HierarchyConfig,
        hierarchy_id: String,
    ) -> Result<Topology, OrchestratorError> {
        if config.global_prompt.trim().is_empty() {
            return Err(invalid("global_prompt", "must not be empty"));
        }
        if config.teams.is_empty() {
            return Err(invalid("teams", "At least one team is required"));
        }

        let mut teams = Vec::with_capacity(config.teams.len());
        let mut seen_team_ids = std::collections::HashSet::new();

        for (team_index, team_config) in config.teams.iter().enumerate() {
            let team_node = Self::build_team(team_config, team_index)?;
            if !seen_team_ids.insert(team_node.team_id.clone()) {
                return Err(invalid("teams[].id", &format!("duplicate team id '{}'", team_node.team_id)));
            }
            teams.push(team_node);
        }

        let global_supervisor_id = format!("global_{}", hierarchy_id);

        Ok(Topology {
            hierarchy_id,
            global_supervisor_id,
            global_prompt: config.global_prompt.clone(),
            teams,
            enable_context_sharing: config.enable_context_sharing,
            execution_mode: config.execution_mode,
        })
    }

    fn build_team(team_config: &TeamConfig, team_index: usize) -> Result<TeamNode, OrchestratorError> {
        if team_config.name.trim().is_empty() {
            return Err(invalid("teams[].name", "must not be empty"));
        }
        if team_config.workers.is_empty() {
            return Err(invalid("teams[].workers", &format!("team '{}' has no workers", team_config.name)));
        }

        let team_id = team_config
            .id
            .clone()
            .unwrap_or_else(|| format!("team_{}", short_hash(&[&team_config.name, &team_index.to_string()], 10)));
        let supervisor_id = format!("supervisor_{}", team_id);

        let mut workers = Vec::with_capacity(team_config.workers.len());
        let mut seen_worker_ids = std::collections::HashSet::new();

        for (worker_index, worker_config) in team_config.workers.iter().enumerate() {
            let worker_node = Self::build_worker(worker_config, &team_id, worker_index)?;
            if !seen_worker_ids.insert(worker_node.worker_id.clone()) {
                return Err(invalid(
                    "teams[].workers[].id",
                    &format!("duplicate worker id '{}' in team '{}'", worker_node.worker_id, team_config.name),
                ));
            }
            workers.push(worker_node);
        }

        Ok(TeamNode {
            team_id,
            team_name: team_config.name.clone(),
            supervisor_id,
            supervisor_prompt: team_config.supervisor_prompt.clone(),
            workers,
            prevent_duplicate: team_config.prevent_duplicate,
            share_context: team_config.share_context,
            max_iterations: team_config.max_iterations,
        })
    }

    fn build_worker(
        worker_config: &WorkerConfig,
        team_id: &str,
        worker_index: usize,
    ) -> Result<WorkerNode, OrchestratorError> {
        if worker_config.name.trim().is_empty() {
            return Err(invalid("teams[].workers[].name", "must not be empty"));
        }
        if worker_config.system_prompt.trim().is_empty() {
            return Err(invalid("teams[].workers[].system_prompt", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&worker_config.temperature) {
            return Err(invalid("teams[].workers[].temperature", "must be within [0, 2]"));
        }
        if worker_config.max_tokens == 0 {
            return Err(invalid("teams[].workers[].max_tokens", "must be greater than zero"));
        }

        let worker_id = worker_config.id.clone().unwrap_or_else(|| {
            format!("worker_{}", short_hash(&[team_id, &worker_config.name, &worker_index.to_string()], 10))
        });

        Ok(WorkerNode {
            worker_id,
            worker_name: worker_config.name.clone(),
            role: worker_config.role.clone(),
            system_prompt: worker_config.system_prompt.clone(),
            tools: worker_config.tools.clone(),
            temperature: worker_config.temperature,
            max_tokens: worker_config.max_tokens,
        })
    }
}

fn invalid(field: &str, reason: &str) -> OrchestratorError {
    OrchestratorError::InvalidConfig { field: field.to_string(), reason: reason.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::{ExecutionMode, HierarchyConfig, TeamConfig, WorkerConfig};

    fn sample_config() -> HierarchyConfig {
        HierarchyConfig {
            global_prompt: "G".to_string(),
            task: "hello".to_string(),
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

    #[test]
    fn deterministic_ids_across_builds() {
        let config = sample_config();
        let t1 = TopologyBuilder::build_with_hierarchy_id(&config, "run-a".to_string()).unwrap();
        let t2 = TopologyBuilder::build_with_hierarchy_id(&config, "run-a".to_string()).unwrap();
        assert_eq!(t1.teams[0].team_id, t2.teams[0].team_id);
        assert_eq!(t1.teams[0].workers[0].worker_id, t2.teams[0].workers[0].worker_id);
        assert_eq!(t1.global_supervisor_id, "global_run-a");
    }

    #[test]
    fn empty_teams_is_invalid() {
        let mut config = sample_config();
        config.teams.clear();
        let err = TopologyBuilder::build(&config).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig { .. }));
    }

    #[test]
    fn empty_workers_is_invalid() {
        let mut config = sample_config();
        config.teams[0].workers.clear();
        let err = TopologyBuilder::build(&config).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidConfig { .. }));
    }

    #[test]
    fn team_of_worker_looks_up_without_back_pointers() {
        let config = sample_config();
        let topology = TopologyBuilder::build(&config).unwrap();
        let worker_id = topology.teams[0].workers[0].worker_id.clone();
        let team = topology.team_of_worker(&worker_id).unwrap();
        assert_eq!(team.team_name, "T1");
    }
}
