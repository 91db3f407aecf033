//! Shared transport for OpenAI-compatible chat-completions providers.
//!
//! OpenAI and OpenRouter both speak the same `/chat/completions` wire format,
//! differing only in base URL and (for OpenRouter) an extra routing header —
//! so a single client does the HTTP work and the two provider modules are
//! thin constructors over it, the same way `ClaudeClient` delegates to
//! `OpenAIClient` in this codebase's existing provider layer.

use crate::error::ModelError;
use crate::model::{InvokeParams, ModelClient, Role, TokenUsage};
use async_trait::async_trait;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

lazy_static! {
    /// Shared HTTP client with persistent connection pooling; kept alive for
    /// the process lifetime so TLS sessions and DNS lookups stay warm across
    /// concurrent model calls.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared HTTP client");
}

/// Borrow the lazily initialized shared [`reqwest::Client`].
pub fn shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
    #[serde(default)]
    total_tokens: usize,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// A chat-completions client against any OpenAI-wire-compatible endpoint.
pub struct OpenAiCompatibleClient {
    api_key: String,
    base_url: String,
    model: String,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiCompatibleClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
            extra_headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((key.into(), value.into()));
        self
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> ModelError {
        if status.as_u16() == 429 || status.is_server_error() {
            ModelError::Transient(format!("HTTP {}: {}", status, body))
        } else {
            ModelError::Permanent(format!("HTTP {}: {}", status, body))
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<(String, TokenUsage), ModelError> {
        let mut messages = Vec::new();
        if let Some(system) = &params.system {
            messages.push(WireMessage { role: role_str(Role::System).to_string(), content: system.clone() });
        }
        messages.push(WireMessage { role: role_str(Role::User).to_string(), content: prompt.to_string() });

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: params.stop_sequences.clone(),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let mut builder = shared_http_client()
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request);
        for (key, value) in &self.extra_headers {
            builder = builder.header(key, value);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ModelError::Transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Permanent(format!("malformed response body: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Permanent("response contained no choices".to_string()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok((choice.message.content, usage))
    }
}
