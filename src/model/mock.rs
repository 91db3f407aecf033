//! Scripted [`ModelClient`] test double.
//!
//! Mirrors this codebase's existing `MockClient` pattern (a canned response
//! wired into the trait under test) but queues a *sequence* of canned
//! responses, since a single orchestration run drives many model calls
//! (team selection, worker selection, worker invocation, global synthesis)
//! that each need their own scripted answer.
//!
//! # Example
//!
//! ```rust
//! use hierarchical_agents::model::mock::MockModelClient;
//! use hierarchical_agents::model::{InvokeParams, ModelClient};
//!
//! # async {
//! let client = MockModelClient::new("mock").with_responses(["T1", "W1", "out", "final"]);
//! let (text, _usage) = client.invoke("anything", &InvokeParams::default()).await.unwrap();
//! assert_eq!(text, "T1");
//! # };
//! ```

use crate::error::ModelError;
use crate::model::{InvokeParams, ModelClient, TokenUsage};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

enum Scripted {
    Text(String),
    Fail(ModelError),
}

pub struct MockModelClient {
    name: String,
    queue: Mutex<VecDeque<Scripted>>,
    invocations: Mutex<Vec<String>>,
}

impl MockModelClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Append a sequence of canned success responses, returned in order, one
    /// per `invoke`/`invoke_structured` call.
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.extend(responses.into_iter().map(|s| Scripted::Text(s.into())));
        }
        self
    }

    /// Append a scripted failure to the queue (e.g. two `Transient` failures
    /// before a success, for retry-path tests).
    pub fn with_failure(self, error: ModelError) -> Self {
        {
            let mut queue = self.queue.lock().unwrap();
            queue.push_back(Scripted::Fail(error));
        }
        self
    }

    /// Prompts passed to every `invoke` call so far, in order — lets tests
    /// assert on what the supervisor/worker actually rendered.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        prompt: &str,
        _params: &InvokeParams,
    ) -> Result<(String, TokenUsage), ModelError> {
        self.invocations.lock().unwrap().push(prompt.to_string());
        let next = self.queue.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok((text, TokenUsage::default())),
            Some(Scripted::Fail(err)) => Err(err),
            None => Err(ModelError::Permanent(
                "MockModelClient: response queue exhausted".to_string(),
            )),
        }
    }
}
