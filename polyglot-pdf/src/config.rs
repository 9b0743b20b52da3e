//! Pipeline configuration: file + environment sources deserialized into
//! serde structs with explicit defaults.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{PipelineError, PipelineResult};

/// Top-level configuration, loaded once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub ocr: OcrConfig,
}

impl AppConfig {
    /// Load from `polyglot.{toml,yaml,json}` (optional) plus `POLYGLOT__*`
    /// environment overrides.
    pub fn load() -> PipelineResult<Self> {
        Config::builder()
            .add_source(File::with_name("polyglot").required(false))
            .add_source(
                Environment::with_prefix("POLYGLOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::Config {
                message: e.to_string(),
            })
    }
}

/// Layout extraction tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// Join consecutive lines into paragraph blocks before translation.
    #[serde(default)]
    pub paragraph_merge: bool,

    /// Only prefer the invisible text layer when it clearly exceeds the
    /// visible one, instead of the plain density comparison.
    #[serde(default)]
    pub layer_fallback_only: bool,

    /// Images covering more than this fraction of a text-bearing page are
    /// suppressed as backgrounds.
    #[serde(default = "default_max_image_coverage")]
    pub max_image_page_coverage: f32,

    /// A page with at least this many extracted text characters suppresses
    /// near-page-frame images.
    #[serde(default = "default_background_text_chars")]
    pub background_text_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            paragraph_merge: false,
            layer_fallback_only: false,
            max_image_page_coverage: default_max_image_coverage(),
            background_text_chars: default_background_text_chars(),
        }
    }
}

/// Translation provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationConfig {
    /// Provider name: "ollama" or "openai".
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token for OpenAI-compatible endpoints.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum blocks per provider request.
    #[serde(default = "default_max_batch_blocks")]
    pub max_batch_blocks: usize,

    /// Maximum total characters per provider request.
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,

    /// Retry attempts for transient failures before quarantining the unit.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Global minimum interval between provider requests, shared by all
    /// workers. Zero disables the gate.
    #[serde(default)]
    pub min_request_interval_ms: u64,

    /// Translations longer than this multiple of the original are discarded
    /// as provider garbage and re-requested.
    #[serde(default = "default_max_expansion_ratio")]
    pub max_expansion_ratio: f32,

    /// Concurrent page workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upload the single-page PDF payload so visually-grounded providers can
    /// use it as context.
    #[serde(default)]
    pub send_page_context: bool,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_batch_blocks: default_max_batch_blocks(),
            max_batch_chars: default_max_batch_chars(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_request_interval_ms: 0,
            max_expansion_ratio: default_max_expansion_ratio(),
            workers: default_workers(),
            send_page_context: false,
        }
    }
}

/// Checkpoint store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_checkpoint_root")]
    pub root: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            root: default_checkpoint_root(),
        }
    }
}

/// Page reconstruction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Lower bound for the dynamic font-size search.
    #[serde(default = "default_min_font_size")]
    pub min_font_size: f32,

    /// Fixed decrement per fitting step.
    #[serde(default = "default_font_size_step")]
    pub font_size_step: f32,

    /// Line height as a multiple of font size.
    #[serde(default = "default_line_height_factor")]
    pub line_height_factor: f32,

    /// Flat-fill the original text area before drawing the translation.
    #[serde(default = "default_true")]
    pub clear_background: bool,

    /// Disable the downward font-size search and always draw at the
    /// original size.
    #[serde(default)]
    pub fixed_font_size: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            min_font_size: default_min_font_size(),
            font_size_step: default_font_size_step(),
            line_height_factor: default_line_height_factor(),
            clear_background: true,
            fixed_font_size: false,
        }
    }
}

/// OCR fallback configuration (off by default)
#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_ocr_model")]
    pub model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_base_url(),
            model: default_ocr_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// ==================== Default Value Functions ====================

fn default_provider() -> String {
    "ollama".to_string()
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_ocr_model() -> String {
    "llama3.2-vision".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_max_batch_blocks() -> usize {
    16
}

fn default_max_batch_chars() -> usize {
    4000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_expansion_ratio() -> f32 {
    6.0
}

fn default_workers() -> usize {
    4
}

fn default_checkpoint_root() -> PathBuf {
    PathBuf::from("./checkpoints")
}

fn default_max_image_coverage() -> f32 {
    0.85
}

fn default_background_text_chars() -> usize {
    120
}

fn default_min_font_size() -> f32 {
    6.0
}

fn default_font_size_step() -> f32 {
    0.5
}

fn default_line_height_factor() -> f32 {
    1.25
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.translation.provider, "ollama");
        assert_eq!(cfg.translation.workers, 4);
        assert!(cfg.render.clear_background);
        assert!(!cfg.ocr.enabled);
        assert_eq!(cfg.checkpoint.root, PathBuf::from("./checkpoints"));
    }
}
