//! Ollama chat-endpoint translator.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TranslationConfig;
use crate::error::{PipelineError, TranslateError};

use super::provider::{BatchRequest, BatchResponse, build_prompt, classify_status, parse_items};

const SYSTEM_PROMPT: &str = "You are a professional document translator. \
    You translate text blocks exactly, preserving meaning and formatting, \
    and reply with strict JSON.";

pub struct OllamaTranslator {
    client: Client,
    config: TranslationConfig,
}

impl OllamaTranslator {
    pub fn new(config: TranslationConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    /// Translate one batch. The single-page PDF context is not used: Ollama
    /// chat endpoints are text-grounded.
    pub async fn translate_batch(
        &self,
        request: BatchRequest,
    ) -> Result<BatchResponse, TranslateError> {
        let url = format!("{}/api/chat", self.config.base_url);

        let body = OllamaChatRequest {
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
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(0.1),
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TranslateError::Connection {
                url: url.clone(),
                source: e,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, message));
        }

        let chat: OllamaChatResponse =
            response
                .json()
                .await
                .map_err(|e| TranslateError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let items = parse_items(&chat.message.content, &request)?;
        let truncated = chat.done_reason.as_deref() == Some("length");

        Ok(BatchResponse { items, truncated })
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
    #[serde(default)]
    done_reason: Option<String>,
}
