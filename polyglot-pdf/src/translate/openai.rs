//! OpenAI-compatible chat-completions translator.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TranslationConfig;
use crate::error::{PipelineError, TranslateError};

use super::provider::{BatchRequest, BatchResponse, build_prompt, classify_status, parse_items};

const SYSTEM_PROMPT: &str = "You are a professional document translator. \
    You translate text blocks exactly, preserving meaning and formatting, \
    and reply with strict JSON.";

pub struct OpenAiTranslator {
    client: Client,
    config: TranslationConfig,
}

impl OpenAiTranslator {
    pub fn new(config: TranslationConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    pub async fn translate_batch(
        &self,
        request: BatchRequest,
    ) -> Result<BatchResponse, TranslateError> {
        let url = format!("{}/v1/chat/completions", self.config.base_url);

        let body = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(&request),
                },
            ],
            temperature: 0.1,
        };

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| TranslateError::Connection {
            url: url.clone(),
            source: e,
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let completion: ChatCompletionResponse =
            response
                .json()
                .await
                .map_err(|e| TranslateError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| TranslateError::InvalidResponse {
                message: "empty choices array".to_string(),
            })?;

        let items = parse_items(&choice.message.content, &request)?;
        let truncated = choice.finish_reason.as_deref() == Some("length");

        Ok(BatchResponse { items, truncated })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}
