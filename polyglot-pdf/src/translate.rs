//! Translation clients: named provider variants behind a small capability
//! interface, adaptive batch splitting, a global rate gate, and the OCR
//! fallback client.

pub mod batching;
pub mod ocr;
pub mod provider;
pub mod rate_limit;

mod ollama;
mod openai;

pub use batching::{BatchPolicy, translate_blocks};
pub use ocr::OcrClient;
pub use provider::{BatchRequest, BatchResponse, BlockRequest, Provider, TranslateBackend};
pub use rate_limit::RateGate;
