//! # Chat Completion Client
//!
//! OpenAI-compatible chat completions backend. The request body is the ordered
//! message list built by the pipeline (fixed system persona followed by the
//! conversation history); the first choice's message content is the reply.

use crate::error::{AppError, AppResult};
use crate::inference::{ChatCompletion, ChatMessage};
use async_trait::async_trait;
use tracing::debug;

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// OpenAI-compatible chat completions API client.
pub struct ChatApiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatApiClient {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl ChatCompletion for ChatApiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> AppResult<String> {
        debug!(
            message_count = messages.len(),
            model = %self.model,
            "requesting chat completion"
        );

        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Inference(format!(
                "chat API error {}: {}",
                status, body
            )));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AppError::Inference("chat API returned no choices".to_string()))
    }
}
