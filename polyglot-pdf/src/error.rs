use std::path::PathBuf;

use thiserror::Error;

/// Main pipeline error type
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Translate(#[from] TranslateError),

    #[error("Layout extraction failed")]
    Extract(#[from] ExtractError),

    #[error("Checkpoint store error")]
    Checkpoint(#[from] CheckpointError),

    #[error("Page reconstruction failed")]
    Render(#[from] RenderError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("IO error")]
    Io(#[from] std::io::Error),
}

/// Translation provider errors.
///
/// The orchestrator cares about three classes: quota exhaustion aborts the
/// whole run, terminal rejections quarantine the page, and transient errors
/// are retried with backoff before quarantining.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("Connection failed to provider at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Provider quota exhausted (status {status}): {message}")]
    QuotaExhausted { status: u16, message: String },

    #[error("Request rejected by provider (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider request failed (status {status}): {message}")]
    Http { status: u16, message: String },

    #[error("Invalid response from provider: {message}")]
    InvalidResponse { message: String },

    #[error("Translation truncated for block {block_id} after exhausting batch splits")]
    Truncated { block_id: String },

    #[error("Retries exhausted after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<TranslateError>,
    },

    #[error("Translation cancelled")]
    Cancelled,
}

impl TranslateError {
    /// Errors worth retrying with backoff before giving up on the unit.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranslateError::Connection { .. } | TranslateError::Http { .. }
        )
    }

    /// Errors that abort the whole run rather than a single page.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TranslateError::QuotaExhausted { .. })
    }
}

/// Layout extraction errors
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to load PDFium library: {message}")]
    PdfiumBinding { message: String },

    #[error("Failed to load PDF document: {message}")]
    DocumentLoad { message: String },

    #[error("Failed to read page {page}: {message}")]
    PageRead { page: u16, message: String },

    #[error("Failed to copy page {page} into a single-page payload: {message}")]
    PagePayload { page: u16, message: String },

    #[error("Page selection matches no pages (document has {total})")]
    EmptySelection { total: u16 },
}

/// Checkpoint store errors.
///
/// Read failures are downgraded to cache misses at the call site; write
/// failures always propagate so a lost checkpoint is never silent.
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Failed to create checkpoint directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write checkpoint file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize checkpoint record")]
    Serialize(#[source] serde_json::Error),
}

/// Page reconstruction errors
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to create output page {page}: {message}")]
    PageCreate { page: u16, message: String },

    #[error("Failed to save output document to {path}: {message}")]
    Save { path: PathBuf, message: String },
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
