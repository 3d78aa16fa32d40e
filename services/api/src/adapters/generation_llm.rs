//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the question-generating LLM.
//! It implements the `TextGenerationService` port from the `core` crate on top of
//! any OpenAI-compatible chat completions endpoint (Gemini exposes one).

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client, error::OpenAIError,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use trivia_core::ports::{PortError, PortResult, TextGenerationService};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TextGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    timeout: Duration,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`. Each completion is bounded by `timeout`.
    pub fn new(client: Client<OpenAIConfig>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

//=========================================================================================
// `TextGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextGenerationService for OpenAiGenerationAdapter {
    async fn complete(&self, model: &str, system: &str, prompt: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.8)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!(model, "Sending chat completion request");
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                PortError::Timeout(format!("model {model} did not answer within {:?}", self.timeout))
            })?
            .map_err(|e: OpenAIError| PortError::Unexpected(format!("{model}: {e}")))?;

        // Extract the text content from the first choice in the response.
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                PortError::Unexpected(format!("{model}: response contained no text content"))
            })
    }
}
