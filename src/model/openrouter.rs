//! OpenRouter [`ModelClient`] — same OpenAI-compatible wire format, different
//! host, used to reach the `aws_bedrock` and third-party model variants named
//! in the provider set (§9) without a bespoke client per upstream vendor.
//!
//! # Example
//!
//! ```rust,no_run
//! use hierarchical_agents::model::openrouter::OpenRouterModelClient;
//!
//! let client = OpenRouterModelClient::new("sk-or-...", "anthropic/claude-3.5-sonnet");
//! ```

use crate::error::ModelError;
use crate::model::http::OpenAiCompatibleClient;
use crate::model::{InvokeParams, ModelClient, TokenUsage};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Talks to `openrouter.ai`, which fronts OpenAI, Anthropic, and Bedrock-backed
/// models behind one OpenAI-wire-compatible endpoint.
pub struct OpenRouterModelClient {
    delegate: OpenAiCompatibleClient,
}

impl OpenRouterModelClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            delegate: OpenAiCompatibleClient::new(api_key, DEFAULT_BASE_URL, model)
                .with_header("HTTP-Referer", "https://github.com/gubatron/hierarchical-agents")
                .with_header("X-Title", "hierarchical-agents"),
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self, ModelError> {
        let key = std::env::var(API_KEY_ENV)
            .map_err(|_| ModelError::Permanent(format!("{} is not set", API_KEY_ENV)))?;
        Ok(Self::new(key, model))
    }
}

#[async_trait]
impl ModelClient for OpenRouterModelClient {
    fn name(&self) -> &str {
        self.delegate.name()
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<(String, TokenUsage), ModelError> {
        self.delegate.invoke(prompt, params).await
    }
}
