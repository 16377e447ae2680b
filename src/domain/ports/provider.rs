//! The provider port consumed by the Fallback Provider Chain (§4.A, §6.1).
//!
//! Grounded on the teacher's `domain/ports/llm_substrate.rs` `LlmSubstrate` trait
//! shape, narrowed to the chat/chat-with-tools contract the spec actually calls for.

use async_trait::async_trait;

use crate::domain::error::ProviderChainError;
use crate::domain::models::{ChatMessage, ChatOptions, ChatResponse, ToolSpec};

/// A single back-end language-model provider, as seen by the Fallback Provider Chain.
///
/// Implementations are expected to handle their own internal retries (§7: "Retried
/// within provider"); the chain only decides whether to move on to the next candidate.
#[async_trait]
pub trait LanguageModelProvider: Send + Sync {
    /// Stable name used in configuration, logging, and events.
    fn name(&self) -> &str;

    /// Priority; lower values are tried first.
    fn priority(&self) -> u32;

    /// Whether this provider is configured (has credentials, etc) independent of
    /// its current health/cooldown state.
    fn is_configured(&self) -> bool;

    /// Whether this provider supports `chat_with_tools` natively. When `false`, the
    /// chain degrades to `chat` with a flattened message list (§4.A).
    fn supports_tools(&self) -> bool {
        false
    }

    /// Plain chat completion.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderChainError>;

    /// Chat completion with tool definitions offered to the model. Default
    /// implementation flattens tools into the message list and delegates to `chat`,
    /// matching §4.A's degrade-gracefully rule.
    async fn chat_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
        options: &ChatOptions,
    ) -> Result<ChatResponse, ProviderChainError> {
        let mut flattened = messages.to_vec();
        if !tools.is_empty() {
            let tool_names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            flattened.push(ChatMessage {
                role: "system".to_string(),
                content: format!("Available tools: {}", tool_names.join(", ")),
            });
        }
        self.chat(&flattened, options).await
    }
}
