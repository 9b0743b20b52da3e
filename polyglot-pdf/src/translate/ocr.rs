//! OCR provider client.
//!
//! Fallback text source for pages whose chosen text layer is empty but
//! which carry image content. Vision-model chat endpoint; image payloads go
//! up base64-encoded.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::OcrConfig;
use crate::error::{PipelineError, TranslateError};

const OCR_PROMPT: &str = "Transcribe all readable text in these images, in \
    reading order. Reply with the text only; reply with an empty message if \
    there is none.";

pub struct OcrClient {
    client: Client,
    config: OcrConfig,
}

impl OcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config {
                message: format!("failed to build OCR HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    /// Extract text from a list of image payloads. `None` when the model
    /// reads nothing.
    pub async fn extract_text(&self, images: &[Vec<u8>]) -> Result<Option<String>, TranslateError> {
        if images.is_empty() {
            return Ok(None);
        }

        let url = format!("{}/api/chat", self.config.base_url);

        let body = OcrChatRequest {
            model: self.config.model.clone(),
            messages: vec![OcrMessage {
                role: "user".to_string(),
                content: OCR_PROMPT.to_string(),
                images: Some(images.iter().map(|i| BASE64.encode(i)).collect()),
            }],
            stream: false,
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
            return Err(super::provider::classify_status(status, message));
        }

        let chat: OcrChatResponse =
            response
                .json()
                .await
                .map_err(|e| TranslateError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let text = chat.message.content.trim().to_string();
        debug!(chars = text.chars().count(), "OCR response received");
        Ok((!text.is_empty()).then_some(text))
    }
}

#[derive(Debug, Serialize)]
struct OcrChatRequest {
    model: String,
    messages: Vec<OcrMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OcrMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct OcrChatResponse {
    message: OcrResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OcrResponseMessage {
    content: String,
}
