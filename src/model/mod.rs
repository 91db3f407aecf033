//! Provider-agnostic LLM invocation capability.
//!
//! Workers and supervisors never talk to a vendor SDK directly — they hold a
//! `Arc<dyn ModelClient>` and call [`ModelClient::invoke`] or
//! [`ModelClient::invoke_structured`]. Concrete providers are a small, closed
//! variant set (`openai`, `openrouter`, a `mock` for tests) chosen at config
//! time, per the "dynamic dispatch over provider SDKs" design note: selection
//! is data, not a subclass hierarchy.
//!
//! # Example
//!
//! ```rust,no_run
//! use hierarchical_agents::model::{InvokeParams, ModelClient};
//! use hierarchical_agents::model::openai::OpenAiModelClient;
//!
//! # async {
//! let client = OpenAiModelClient::from_env("gpt-4o-mini")?;
//! let (text, usage) = client.invoke("Say hello", &InvokeParams::default()).await?;
//! println!("{} ({} tokens)", text, usage.total_tokens);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # };
//! ```

pub mod http;
pub mod mock;
pub mod openai;
pub mod openrouter;
pub mod provider;

use crate::error::ModelError;
use async_trait::async_trait;

/// Role of a single message in a chat-style prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Parameters accepted by [`ModelClient::invoke`] (§4.1).
#[derive(Debug, Clone)]
pub struct InvokeParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub system: Option<String>,
}

impl Default for InvokeParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2048,
            stop_sequences: Vec::new(),
            system: None,
        }
    }
}

/// Prompt/completion token accounting reported by a provider, when available.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Abstract LLM invocation capability (§4.1).
///
/// Implementations translate `prompt`/`params` into a provider-specific wire
/// request and classify failures into [`ModelError::Transient`] (network, 5xx,
/// rate-limit) or [`ModelError::Permanent`] (bad auth, other 4xx, malformed
/// request) at the boundary — callers above this trait never inspect
/// provider-specific error shapes.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Identifier used for logging (e.g. `"gpt-4o-mini"`).
    fn name(&self) -> &str;

    /// Send a single prompt, return the completion text and token usage.
    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<(String, TokenUsage), ModelError>;

    /// Ask the model to pick one of `choices` and return its index.
    ///
    /// The default implementation renders a numbered menu and asks for "the
    /// single best number", reusing [`ModelClient::invoke`] — this is exactly
    /// the reformulated-prompt retry step the selection algorithm in
    /// [`crate::supervisor`] falls back to (§4.3 step 4). Providers rarely need
    /// to override this; it exists on the trait because §4.1 specifies it as a
    /// first-class capability, not an implementation detail of one caller.
    async fn invoke_structured(
        &self,
        prompt: &str,
        choices: &[String],
        params: &InvokeParams,
    ) -> Result<(usize, Option<String>), ModelError> {
        if choices.is_empty() {
            return Err(ModelError::Permanent("no choices supplied".to_string()));
        }
        let menu: String = choices
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n");
        let menu_prompt = format!(
            "{}\n\nChoose the single best option by number:\n{}\n\nRespond with ONLY the number.",
            prompt, menu
        );
        let (text, _usage) = self.invoke(&menu_prompt, params).await?;
        let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
        let index: usize = digits
            .parse()
            .map_err(|_| ModelError::Permanent(format!("could not parse a choice number from '{}'", text)))?;
        if index == 0 || index > choices.len() {
            return Err(ModelError::Permanent(format!(
                "choice number {} out of range 1..={}",
                index,
                choices.len()
            )));
        }
        Ok((index - 1, None))
    }
}
