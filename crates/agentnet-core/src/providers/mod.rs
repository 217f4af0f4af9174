//! Chat-completion backends used by [`ChatAgent`](crate::agent::ChatAgent)

use anyhow::Result;
use async_trait::async_trait;

use crate::tools::ToolDefinition;
use crate::types::Message;

pub mod openai;

pub use openai::OpenAiProvider;

/// Trait that all LLM providers implement
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier (e.g. "gpt-4o-mini")
    fn model(&self) -> &str;

    /// Run one completion round over the conversation so far.
    ///
    /// The returned message has the assistant role and carries any tool calls
    /// the model requested.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        temperature: f32,
    ) -> Result<Message>;
}
