//! Concrete provider selection as data, not dynamic dispatch (§9 "Dynamic
//! dispatch over provider SDKs").
//!
//! [`crate::bin::server`]'s `build_model_client` used to pick a branch and
//! return `Arc::new(OpenAiModelClient::...)` or `Arc::new(OpenRouterModelClient::...)`
//! — two different concrete types behind the same trait object, decided by
//! runtime branching. [`ProviderClient`] collapses that into one concrete
//! enum: the branch still exists (there is still a decision to make from
//! environment credentials), but the *type* returned to the rest of the
//! process is always `ProviderClient`, and the variant it holds is ordinary
//! data rather than a vtable choice. The rest of the orchestrator is
//! unaffected — it still holds `Arc<dyn ModelClient>`, satisfied here by
//! [`ProviderClient`]'s delegating impl, exactly as it would be satisfied by
//! a test double (§10.4).

use crate::model::openai::OpenAiModelClient;
use crate::model::openrouter::OpenRouterModelClient;
use crate::model::{InvokeParams, ModelClient, TokenUsage};
use crate::error::ModelError;
use async_trait::async_trait;

/// The closed set of real providers this crate ships an adapter for.
/// Adding a provider (`aws_bedrock`, per §9's `{openai, openrouter,
/// aws_bedrock, ...}`) means adding a variant here, not a new trait-object
/// call site.
pub enum ProviderClient {
    OpenAi(OpenAiModelClient),
    OpenRouter(OpenRouterModelClient),
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn name(&self) -> &str {
        match self {
            ProviderClient::OpenAi(client) => client.name(),
            ProviderClient::OpenRouter(client) => client.name(),
        }
    }

    async fn invoke(
        &self,
        prompt: &str,
        params: &InvokeParams,
    ) -> Result<(String, TokenUsage), ModelError> {
        match self {
            ProviderClient::OpenAi(client) => client.invoke(prompt, params).await,
            ProviderClient::OpenRouter(client) => client.invoke(prompt, params).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_name_delegates_to_the_wrapped_adapter() {
        let client = ProviderClient::OpenAi(OpenAiModelClient::new("sk-test", "gpt-4o-mini"));
        assert_eq!(client.name(), "gpt-4o-mini");

        let client = ProviderClient::OpenRouter(OpenRouterModelClient::new("sk-test", "anthropic/claude-3.5-sonnet"));
        assert_eq!(client.name(), "anthropic/claude-3.5-sonnet");
    }
}
