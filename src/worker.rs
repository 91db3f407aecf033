//! Leaf task execution (§4.2).
//!
//! A [`Worker`] is stateless: it holds no mutable state between calls, and
//! its output depends only on the arguments passed to
//! [`Worker::execute`]. Retry/backoff and timeouts are the scheduler's
//! concern, not the worker's — `execute` either returns an output or
//! propagates a [`ModelError`] classification upward unchanged.

use crate::error::ModelError;
use crate::model::{InvokeParams, Message, ModelClient, Role, TokenUsage};
use std::sync::Arc;

/// Output of a single worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerOutput {
    pub text: String,
    pub tokens_used: TokenUsage,
}

/// Caps the number of `ModelClient` calls a single [`Worker::execute`] may
/// make when a tool-use loop is enabled (§4.2 default 5). Distinct from a
/// team's selection-round cap (`TeamConfig::max_iterations`, default 8).
const DEFAULT_MAX_ITERATIONS: usize = 5;

/// Executes a single leaf subtask against a [`ModelClient`] (§4.2).
pub struct Worker {
    pub worker_id: String,
    pub worker_name: String,
    pub role: String,
    pub system_prompt: String,
    pub tools: Vec<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: usize,
    client: Arc<dyn ModelClient>,
}

impl Worker {
    pub fn new(
        worker_id: impl Into<String>,
        worker_name: impl Into<String>,
        role: impl Into<String>,
        system_prompt: impl Into<String>,
        tools: Vec<String>,
        temperature: f32,
        max_tokens: u32,
        client: Arc<dyn ModelClient>,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            worker_name: worker_name.into(),
            role: role.into(),
            system_prompt: system_prompt.into(),
            tools,
            temperature,
            max_tokens,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            client,
        }
    }

    /// Produce output for `task_text`, optionally folding in a shared-context
    /// snippet accumulated by the team so far.
    ///
    /// Without declared tools this is a single `ModelClient` call. With
    /// declared tools, the worker loops up to `max_iterations` times,
    /// re-invoking the model with its own prior output appended as context —
    /// tool *execution* stays out of scope (§1 Non-goals), so each iteration
    /// only gives the model a chance to continue reasoning about the
    /// declared tool names, not to actually run them.
    pub async fn execute(
        &self,
        task_text: &str,
        shared_context: Option<&str>,
    ) -> Result<WorkerOutput, ModelError> {
        let prompt = self.render_prompt(task_text, shared_context);
        let params = InvokeParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop_sequences: Vec::new(),
            system: Some(self.system_prompt.clone()),
        };

        if self.tools.is_empty() {
            let (text, tokens_used) = self.client.invoke(&prompt, &params).await?;
            return Ok(WorkerOutput { text, tokens_used });
        }

        let mut transcript = prompt;
        let mut last = WorkerOutput { text: String::new(), tokens_used: TokenUsage::default() };
        let iterations = self.max_iterations.max(1);
        for iteration in 0..iterations {
            let (text, tokens_used) = self.client.invoke(&transcript, &params).await?;
            last = WorkerOutput { text: text.clone(), tokens_used };
            if iteration + 1 == iterations {
                break;
            }
            transcript = format!("{}\n\n{}", transcript, text);
        }
        Ok(last)
    }

    fn render_prompt(&self, task_text: &str, shared_context: Option<&str>) -> String {
        let mut messages = vec![Message { role: Role::User, content: task_text.to_string() }];
        if let Some(context) = shared_context {
            messages.insert(0, Message { role: Role::User, content: format!("Context so far:\n{}", context) });
        }
        if !self.tools.is_empty() {
            messages.push(Message {
                role: Role::User,
                content: format!("Declared tools available: {}", self.tools.join(", ")),
            });
        }
        messages.iter().map(|m| m.content.clone()).collect::<Vec<_>>().join("\n\n")
    }
}
