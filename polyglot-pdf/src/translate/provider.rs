//! Provider capability interface and shared wire handling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use crate::config::TranslationConfig;
use crate::error::{PipelineError, TranslateError};
use crate::model::TranslatedTextItem;

use super::ollama::OllamaTranslator;
use super::openai::OpenAiTranslator;

/// One block of a provider request.
#[derive(Debug, Clone)]
pub struct BlockRequest {
    pub id: String,
    pub text: String,
}

/// A bounded batch of blocks plus target language and optional single-page
/// PDF context for providers that ground translation visually.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub blocks: Vec<BlockRequest>,
    pub target_lang: String,
    pub context_pdf: Option<Arc<Vec<u8>>>,
}

/// Items keyed by block id plus a truncation marker (the provider hit its
/// output ceiling before covering the batch).
#[derive(Debug, Clone)]
pub struct BatchResponse {
    pub items: Vec<TranslatedTextItem>,
    pub truncated: bool,
}

/// Capability interface over translation providers.
pub trait TranslateBackend: Send + Sync {
    fn translate_batch(
        &self,
        request: BatchRequest,
    ) -> impl Future<Output = Result<BatchResponse, TranslateError>> + Send;

    fn name(&self) -> &'static str;
}

/// Named provider variants, selected by configuration.
pub enum Provider {
    Ollama(OllamaTranslator),
    OpenAi(OpenAiTranslator),
}

impl Provider {
    pub fn from_config(config: &TranslationConfig) -> Result<Self, PipelineError> {
        match config.provider.as_str() {
            "ollama" => Ok(Provider::Ollama(OllamaTranslator::new(config.clone())?)),
            "openai" => Ok(Provider::OpenAi(OpenAiTranslator::new(config.clone())?)),
            other => Err(PipelineError::Config {
                message: format!("unknown translation provider \"{other}\""),
            }),
        }
    }
}

impl TranslateBackend for Provider {
    fn translate_batch(
        &self,
        request: BatchRequest,
    ) -> impl Future<Output = Result<BatchResponse, TranslateError>> + Send {
        async move {
            match self {
                Provider::Ollama(p) => p.translate_batch(request).await,
                Provider::OpenAi(p) => p.translate_batch(request).await,
            }
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Provider::Ollama(_) => "ollama",
            Provider::OpenAi(_) => "openai",
        }
    }
}

/// Chat prompt shared by both providers: the model gets the blocks as a JSON
/// array and must return the same array shape with translated text.
pub(super) fn build_prompt(request: &BatchRequest) -> String {
    let blocks: Vec<serde_json::Value> = request
        .blocks
        .iter()
        .map(|b| serde_json::json!({ "id": b.id, "text": b.text }))
        .collect();

    format!(
        "Translate the \"text\" field of every block below into {lang}.\n\
         Reply with ONLY a JSON array of objects {{\"id\", \"text\"}}, one per \
         input block, same ids, translated text. Preserve numbers, \
         placeholders, and inline punctuation. Do not add commentary.\n\n{blocks}",
        lang = request.target_lang,
        blocks = serde_json::Value::Array(blocks),
    )
}

#[derive(Debug, Deserialize)]
struct WireItem {
    id: String,
    text: String,
}

/// Parse a provider reply into items, pairing each with its original text.
/// Unknown ids are dropped with a warning; a reply without a parseable JSON
/// array is an [`TranslateError::InvalidResponse`].
pub(super) fn parse_items(
    content: &str,
    request: &BatchRequest,
) -> Result<Vec<TranslatedTextItem>, TranslateError> {
    let json = extract_json_array(content).ok_or_else(|| TranslateError::InvalidResponse {
        message: "no JSON array in provider output".to_string(),
    })?;
    let wire: Vec<WireItem> =
        serde_json::from_str(json).map_err(|e| TranslateError::InvalidResponse {
            message: e.to_string(),
        })?;

    let originals: HashMap<&str, &str> = request
        .blocks
        .iter()
        .map(|b| (b.id.as_str(), b.text.as_str()))
        .collect();

    let mut items = Vec::with_capacity(wire.len());
    for item in wire {
        match originals.get(item.id.as_str()) {
            Some(original) => items.push(TranslatedTextItem {
                block_id: item.id,
                original_text: (*original).to_string(),
                translated_text: item.text,
            }),
            None => warn!(block = %item.id, "Provider returned an unrequested block id"),
        }
    }
    Ok(items)
}

/// Locate the JSON array inside a chat reply, tolerating markdown fences and
/// prose around it.
fn extract_json_array(content: &str) -> Option<&str> {
    let start = content.find('[')?;
    let end = content.rfind(']')?;
    (start < end).then(|| &content[start..=end])
}

/// Shared HTTP status classification for provider errors.
pub(super) fn classify_status(status: u16, message: String) -> TranslateError {
    let lowered = message.to_lowercase();
    match status {
        402 => TranslateError::QuotaExhausted { status, message },
        429 if lowered.contains("quota") || lowered.contains("billing") => {
            TranslateError::QuotaExhausted { status, message }
        }
        // Plain 429 is throttling: transient, retried with backoff.
        429 => TranslateError::Http { status, message },
        400 | 401 | 403 | 404 | 413 | 422 => TranslateError::Rejected { status, message },
        _ => TranslateError::Http { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&str, &str)]) -> BatchRequest {
        BatchRequest {
            blocks: pairs
                .iter()
                .map(|(id, text)| BlockRequest {
                    id: id.to_string(),
                    text: text.to_string(),
                })
                .collect(),
            target_lang: "fr".to_string(),
            context_pdf: None,
        }
    }

    #[test]
    fn test_parse_items_plain_array() {
        let req = request(&[("b1", "Hello world")]);
        let items =
            parse_items(r#"[{"id": "b1", "text": "Bonjour le monde"}]"#, &req).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original_text, "Hello world");
        assert_eq!(items[0].translated_text, "Bonjour le monde");
    }

    #[test]
    fn test_parse_items_tolerates_fences() {
        let req = request(&[("b1", "Hello")]);
        let content = "Here you go:\n```json\n[{\"id\": \"b1\", \"text\": \"Salut\"}]\n```";
        let items = parse_items(content, &req).unwrap();
        assert_eq!(items[0].translated_text, "Salut");
    }

    #[test]
    fn test_parse_items_drops_unknown_ids() {
        let req = request(&[("b1", "Hello")]);
        let content = r#"[{"id": "b1", "text": "Salut"}, {"id": "bogus", "text": "x"}]"#;
        let items = parse_items(content, &req).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_parse_items_rejects_prose() {
        let req = request(&[("b1", "Hello")]);
        assert!(matches!(
            parse_items("I cannot translate that.", &req),
            Err(TranslateError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(402, "payment required".into()),
            TranslateError::QuotaExhausted { .. }
        ));
        assert!(matches!(
            classify_status(429, "monthly quota exceeded".into()),
            TranslateError::QuotaExhausted { .. }
        ));
        assert!(matches!(
            classify_status(429, "slow down".into()),
            TranslateError::Http { .. }
        ));
        assert!(matches!(
            classify_status(422, "bad request".into()),
            TranslateError::Rejected { .. }
        ));
        assert!(matches!(
            classify_status(503, "unavailable".into()),
            TranslateError::Http { .. }
        ));
    }
}
