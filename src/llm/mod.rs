mod openai_compat;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;

pub use openai_compat::ChatCompletionsModel;

/// One entry of the transcript sent to the model. The runner rebuilds the
/// system entry from the active agent's instructions on every call.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ModelToolCall>,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelToolCall {
    /// Never empty; adapters synthesize one when the provider omits it.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Function declaration offered to the model, hand-off tools included.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelToolChoice {
    Auto,
    None,
    /// Forces a call to the named tool.
    Tool(String),
}

/// Asks the provider for a JSON object matching `schema`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponseFormat {
    pub name: String,
    pub schema: Value,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelCompletion {
    pub text: Option<String>,
    /// Reasoning text, when the provider exposes it.
    pub thinking: Option<String>,
    pub tool_calls: Vec<ModelToolCall>,
    pub usage: Option<ModelUsage>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModelUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// One chat completion round trip. Implementations must not retry on their
/// own; failures surface to the caller as [`ProviderError`].
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
        response_format: Option<&ModelResponseFormat>,
    ) -> Result<ModelCompletion, ProviderError>;
}

// Lets one model instance be shared between a runner and agent overrides.
#[async_trait]
impl<M> ChatModel for Arc<M>
where
    M: ChatModel + ?Sized,
{
    async fn invoke(
        &self,
        messages: &[ModelMessage],
        tools: &[ModelToolDefinition],
        tool_choice: ModelToolChoice,
        response_format: Option<&ModelResponseFormat>,
    ) -> Result<ModelCompletion, ProviderError> {
        self.as_ref()
            .invoke(messages, tools, tool_choice, response_format)
            .await
    }
}
