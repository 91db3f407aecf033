//! OpenAI chat-completions [`ModelClient`].
//!
//! # Example
//!
//! ```rust,no_run
//! use hierarchical_agents::model::openai::OpenAiModelClient;
//!
//! let client = OpenAiModelClient::new("sk-...", "gpt-4o-mini");
//! ```

use crate::error::ModelError;
use crate::model::http::OpenAiCompatibleClient;
use crate::model::{InvokeParams, ModelClient, TokenUsage};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Talks to `api.openai.com` (or an OpenAI-compatible self-hosted endpoint).
pub struct OpenAiModelClient {
    delegate: OpenAiCompatibleClient,
}

impl OpenAiModelClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { delegate: OpenAiCompatibleClient::new(api_key, DEFAULT_BASE_URL, model) }
    }

    pub fn with_base_url(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self { delegate: OpenAiCompatibleClient::new(api_key, base_url, model) }
    }

    /// Read the API key from `OPENAI_API_KEY`, matching the credential-loading
    /// convention this codebase's other provider clients already follow.
    pub fn from_env(model: impl Into<String>) -> Result<Self, ModelError> {
        let key = std::env::var(API_KEY_ENV)
            .map_err(|_| ModelError::Permanent(format!("{} is not set", API_KEY_ENV)))?;
        Ok(Self::new(key, model))
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
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
