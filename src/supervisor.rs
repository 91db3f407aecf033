//! Routing/selection layer (§4.3).
//!
//! A [`Supervisor`] never executes a subtask itself — it picks which
//! candidate (worker or sub-team) should go next, then the scheduler invokes
//! that candidate. The matching ladder in [`Supervisor::select_one`] is
//! grounded in this codebase's existing moderator-selection logic: try an
//! exact match, fall back to a fuzzy case-folded match, then to a
//! structured retry, then to the first remaining candidate rather than
//! failing the whole team.

use crate::error::OrchestratorError;
use crate::model::{InvokeParams, ModelClient};
use std::sync::Arc;

/// A routable candidate presented to a supervisor (§4.3).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub name: String,
    pub description: Option<String>,
    pub capabilities: Vec<String>,
}

impl Candidate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), description: None, capabilities: Vec::new() }
    }
}

/// Outcome of [`Supervisor::select_one_structured`]: the chosen candidate
/// name plus, when the model supplied one, its stated reasoning.
#[derive(Debug, Clone)]
pub struct Selection {
    pub name: String,
    pub reasoning: Option<String>,
    /// `true` when no candidate could be resolved from the model's response
    /// and selection fell back to the first remaining candidate (§4.3 step
    /// 5) — callers use this to emit a `supervisor_fallback` event.
    pub fell_back: bool,
}

/// How many reformulated-prompt retries [`Supervisor::select_one_structured`]
/// attempts before falling back to the first candidate (§4.3 step 4).
const SELECTION_RETRIES: usize = 2;

/// Routes a task to one of a set of candidates (§4.3).
pub struct Supervisor {
    pub supervisor_id: String,
    pub system_prompt: String,
    client: Arc<dyn ModelClient>,
}

impl Supervisor {
    pub fn new(supervisor_id: impl Into<String>, system_prompt: impl Into<String>, client: Arc<dyn ModelClient>) -> Self {
        Self { supervisor_id: supervisor_id.into(), system_prompt: system_prompt.into(), client }
    }

    /// `SelectOne(task, candidates[]) -> name` (§4.3).
    pub async fn select_one(&self, task: &str, candidates: &[Candidate]) -> Result<String, OrchestratorError> {
        Ok(self.select_one_structured(task, candidates).await?.name)
    }

    /// `SelectOneStructured(task, candidates[]) -> (name, reasoning)` (§4.3).
    ///
    /// Runs the full selection algorithm: one free-form attempt, then up to
    /// [`SELECTION_RETRIES`] structured-menu retries, then a deterministic
    /// fallback to the first candidate.
    pub async fn select_one_structured(
        &self,
        task: &str,
        candidates: &[Candidate],
    ) -> Result<Selection, OrchestratorError> {
        if candidates.is_empty() {
            return Err(OrchestratorError::SelectionFailure("no candidates to select from".to_string()));
        }
        if task.trim().is_empty() {
            return Err(OrchestratorError::SelectionFailure("task is blank".to_string()));
        }

        let params = InvokeParams { system: Some(self.system_prompt.clone()), ..InvokeParams::default() };

        let prompt = render_prompt(task, candidates);
        // A failed or unparseable free-form attempt is treated the same as an
        // unresolved response: both fall through to the structured-menu retry
        // ladder below rather than failing the whole selection outright.
        if let Ok((response, _usage)) = self.client.invoke(&prompt, &params).await {
            if let Some((name, reasoning)) = resolve(&response, candidates) {
                return Ok(Selection { name, reasoning, fell_back: false });
            }
        }

        let names: Vec<String> = candidates.iter().map(|c| c.name.clone()).collect();
        for _ in 0..SELECTION_RETRIES {
            match self.client.invoke_structured(&prompt, &names, &params).await {
                Ok((index, reasoning)) => {
                    if let Some(candidate) = candidates.get(index) {
                        return Ok(Selection { name: candidate.name.clone(), reasoning, fell_back: false });
                    }
                }
                Err(_) => continue,
            }
        }

        Ok(Selection { name: candidates[0].name.clone(), reasoning: None, fell_back: true })
    }

    /// Produce a short synthesis of `context` (§4.5 step 8 "a
    /// supervisor-produced summary when `share_context=true`"), used by a
    /// team's `team_completed` event in place of plain concatenation of
    /// worker outputs.
    pub async fn summarize(&self, task: &str, context: &str) -> Result<String, OrchestratorError> {
        let params = InvokeParams { system: Some(self.system_prompt.clone()), ..InvokeParams::default() };
        let prompt = format!(
            "Task: {}\n\nTeam output so far:\n{}\n\nSummarize the team's result for downstream consumers in a few sentences.",
            task, context
        );
        let (summary, _usage) = self.client.invoke(&prompt, &params).await?;
        Ok(summary)
    }
}

fn render_prompt(task: &str, candidates: &[Candidate]) -> String {
    let listing: String = candidates
        .iter()
        .map(|c| {
            let mut line = format!("- {}", c.name);
            if let Some(description) = &c.description {
                line.push_str(&format!(": {}", description));
            }
            if !c.capabilities.is_empty() {
                line.push_str(&format!(" [{}]", c.capabilities.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Task: {}\n\nCandidates:\n{}\n\nRespond with the name of the best candidate.", task, listing)
}

/// Extract a candidate name and optional reasoning from a free-form model
/// response (§4.3 steps 3a-3c): exact match, then case-folded
/// prefix/substring match, then a `SELECTED: X` line.
fn resolve(response: &str, candidates: &[Candidate]) -> Option<(String, Option<String>)> {
    let trimmed = response.trim();

    if let Some(candidate) = candidates.iter().find(|c| c.name == trimmed) {
        return Some((candidate.name.clone(), None));
    }

    if let Some(name) = fuzzy_match(trimmed, candidates) {
        return Some((name, None));
    }

    if let Some(selected_line) = response.lines().find(|line| line.to_lowercase().trim_start().starts_with("selected:")) {
        let value = selected_line.splitn(2, ':').nth(1).unwrap_or("").trim();
        if let Some(candidate) = candidates.iter().find(|c| c.name == value) {
            let reasoning = response
                .lines()
                .find(|line| line.to_lowercase().trim_start().starts_with("reasoning:"))
                .map(|line| line.splitn(2, ':').nth(1).unwrap_or("").trim().to_string());
            return Some((candidate.name.clone(), reasoning));
        }
        if let Some(name) = fuzzy_match(value, candidates) {
            return Some((name, None));
        }
    }

    None
}

/// Case-folded, trimmed prefix-or-substring match, accepted only when it
/// resolves to exactly one candidate.
fn fuzzy_match(text: &str, candidates: &[Candidate]) -> Option<String> {
    let needle = text.to_lowercase();
    let matches: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| {
            let hay = c.name.to_lowercase();
            hay == needle || hay.starts_with(&needle) || hay.contains(&needle)
        })
        .collect();
    if matches.len() == 1 {
        Some(matches[0].name.clone())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mock::MockModelClient;

    fn candidates() -> Vec<Candidate> {
        vec![Candidate::new("Researcher"), Candidate::new("Writer")]
    }

    fn supervisor(client: MockModelClient) -> Supervisor {
        Supervisor::new("supervisor_1", "Pick one.", Arc::new(client))
    }

    #[tokio::test]
    async fn exact_match_selects_directly() {
        let s = supervisor(MockModelClient::new("mock").with_responses(["Writer"]));
        let selection = s.select_one_structured("do it", &candidates()).await.unwrap();
        assert_eq!(selection.name, "Writer");
        assert!(!selection.fell_back);
    }

    #[tokio::test]
    async fn fuzzy_match_tolerates_case_and_whitespace() {
        let s = supervisor(MockModelClient::new("mock").with_responses(["  writer  "]));
        let selection = s.select_one_structured("do it", &candidates()).await.unwrap();
        assert_eq!(selection.name, "Writer");
    }

    #[tokio::test]
    async fn selected_line_is_parsed() {
        let s = supervisor(
            MockModelClient::new("mock").with_responses(["SELECTED: Researcher\nREASONING: best fit"]),
        );
        let selection = s.select_one_structured("do it", &candidates()).await.unwrap();
        assert_eq!(selection.name, "Researcher");
        assert_eq!(selection.reasoning.as_deref(), Some("best fit"));
    }

    #[tokio::test]
    async fn unresolvable_response_falls_back_to_first_candidate() {
        let s = supervisor(MockModelClient::new("mock").with_responses(["I am not sure", "nope", "still no"]));
        let selection = s.select_one_structured("do it", &candidates()).await.unwrap();
        assert_eq!(selection.name, "Researcher");
        assert!(selection.fell_back);
    }

    #[tokio::test]
    async fn empty_candidates_fails() {
        let s = supervisor(MockModelClient::new("mock"));
        let err = s.select_one_structured("do it", &[]).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SelectionFailure(_)));
    }

    #[tokio::test]
    async fn blank_task_fails() {
        let s = supervisor(MockModelClient::new("mock"));
        let err = s.select_one_structured("   ", &candidates()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::SelectionFailure(_)));
    }

    #[tokio::test]
    async fn summarize_returns_the_model_response() {
        let s = supervisor(MockModelClient::new("mock").with_responses(["Researcher and Writer finished the brief."]));
        let summary = s.summarize("write a brief", "[Researcher]: facts\n\n[Writer]: draft").await.unwrap();
        assert_eq!(summary, "Researcher and Writer finished the brief.");
    }

    #[tokio::test]
    async fn summarize_propagates_model_failure() {
        let s = supervisor(MockModelClient::new("mock").with_failure(crate::error::ModelError::Permanent("down".to_string())));
        let err = s.summarize("write a brief", "context").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ModelPermanent(_)));
    }
}
