use async_trait::async_trait;

use crate::errors::VoxPlayResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Unified LLM provider trait. New backends implement this and get
/// registered by id in `ProviderRegistry`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches the config.toml key).
    fn name(&self) -> &str;

    /// Single non-streaming chat completion.
    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> VoxPlayResult<LlmResponse>;
}
