//! Blocking client for OpenAI-style chat-completion endpoints that accept
//! image input.

use base64::Engine;
use hma_core::{AnalysisError, ApiResponse, VisionAnalyzer};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Option<Duration>,
}

impl VisionClientConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

pub fn image_data_uri(image: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(image)
    )
}

/// Single-turn request carrying the prompt and the image.
pub fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    image: &[u8],
    max_tokens: u32,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text { text: prompt },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_data_uri(image),
                    },
                },
            ],
        }],
        max_tokens,
    }
}

pub struct ChatCompletionsClient {
    client: Client,
    config: VisionClientConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: VisionClientConfig) -> Result<Self, AnalysisError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|err| AnalysisError::Transport(err.to_string()))?;
        Ok(Self { client, config })
    }
}

impl VisionAnalyzer for ChatCompletionsClient {
    fn analyze(&self, image: &[u8], prompt: &str) -> Result<ApiResponse, AnalysisError> {
        let request = build_request(&self.config.model, prompt, image, self.config.max_tokens);
        debug!(
            event = "analysis_request",
            endpoint = %self.config.endpoint,
            model = %self.config.model,
            image_bytes = image.len(),
            prompt_chars = prompt.len()
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|err| AnalysisError::Transport(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            // An unreadable error body still reports the status.
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Http {
                status: status.as_u16(),
                body,
            });
        }
        let text = response
            .text()
            .map_err(|err| AnalysisError::Transport(err.to_string()))?;

        let raw: Value =
            serde_json::from_str(&text).map_err(|err| AnalysisError::Decode(err.to_string()))?;
        let response = ApiResponse::from_value(raw);
        info!(
            event = "analysis_response",
            status = status.as_u16(),
            chat_completion = response.content().is_some()
        );
        Ok(response)
    }
}
