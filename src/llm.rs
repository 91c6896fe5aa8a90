// src/llm.rs
// LLM provider abstraction - pluggable chat-completion backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Error types for LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// LLM provider trait - implement this to support new backends
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// One chat-completion round trip: system instruction + user prompt in,
    /// raw assistant text out.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Chat-completions provider for OpenAI-compatible endpoints.
pub struct OpenAiChatProvider {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    json_mode: bool,
    client: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(base_url: String, api_key: String, model: String, temperature: f32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            temperature,
            json_mode: false,
            client: reqwest::Client::new(),
        }
    }

    /// Ask the endpoint for constrained JSON output. The response then
    /// arrives as a JSON object rather than free-form text; the chunker's
    /// parser accepts both shapes.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiChatProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting chat completion");

        let req = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::InvalidResponse(format!(
                "LLM endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        info!(model = %self.model, response_len = content.len(), "Completion received");
        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
