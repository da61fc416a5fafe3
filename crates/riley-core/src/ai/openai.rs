use std::fmt;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::ChatError;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

/// One chat-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl OpenAIClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ChatError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client from the configured key, endpoint and timeout.
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        Self::new(
            config.api_key()?,
            &config.api_base,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt.as_deref().filter(|s| !s.trim().is_empty()) {
            messages.push(OpenAIMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(OpenAIMessage {
            role: "user",
            content: &request.user_prompt,
        });

        let body = OpenAIRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            model = %request.model,
            prompt_chars = request.user_prompt.chars().count(),
            "sending chat completion"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let completion: OpenAIResponse = read_json(response).await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::ModelResponse("completion has no choices".to_string()))?;

        if content.trim().is_empty() {
            return Err(ChatError::ModelResponse("completion is empty".to_string()));
        }
        Ok(content)
    }

    pub async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ChatError> {
        debug!(model, text_chars = text.chars().count(), "requesting embedding");

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&EmbeddingRequest { model, input: text })
            .send()
            .await?;

        let embeddings: EmbeddingResponse = read_json(response).await?;
        let embedding = embeddings
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ChatError::ModelResponse("no embedding returned".to_string()))?;

        if embedding.is_empty() {
            return Err(ChatError::ModelResponse("embedding is empty".to_string()));
        }
        Ok(embedding)
    }
}

/// Fail on non-2xx with the status, then decode the body.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ChatError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), %body, "OpenAI API returned an error");
        return Err(ChatError::ModelStatus {
            status: status.as_u16(),
            body,
        });
    }

    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| ChatError::ModelResponse(format!("invalid JSON from OpenAI: {}", e)))
}
