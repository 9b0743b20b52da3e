//! Flat-text mode: translate plain page text without layout reconstruction.
//!
//! Pages are chunked by paragraph under a character budget and pushed
//! through the same checkpoint records and translation client as the layout
//! pipeline; output is a plain-text sidecar. Checkpoints live under the
//! parallel `text-runs/` tree, keyed by chunk index.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use pdfium_render::prelude::*;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, PageCheckpoint, PageStatus};
use crate::error::{ExtractError, PipelineError, PipelineResult, TranslateError};
use crate::model::{TranslatedTextItem, clean_text};
use crate::pages::PageSelection;
use crate::pipeline::RunSummary;
use crate::translate::{BatchPolicy, BlockRequest, RateGate, TranslateBackend, translate_blocks};

/// Character budget per chunk; paragraphs are packed greedily under it.
const MAX_CHUNK_CHARS: usize = 2400;

/// One unit of flat-text work.
#[derive(Debug, Clone)]
pub struct TextChunk {
    /// 1-indexed chunk number; doubles as the checkpoint page number.
    pub number: u16,
    pub id: String,
    pub text: String,
}

/// Split the document's selected pages into paragraph chunks.
pub fn chunk_document(
    document: &PdfDocument,
    selection: &PageSelection,
) -> Result<Vec<TextChunk>, ExtractError> {
    let mut paragraphs: Vec<String> = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_number = index as u16 + 1;
        if !selection.contains(page_number) {
            continue;
        }
        let text = match page.text() {
            Ok(text) => text.all(),
            Err(e) => {
                warn!(page = page_number, error = ?e, "Skipping unreadable page text");
                continue;
            }
        };
        paragraphs.extend(
            text.split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for paragraph in paragraphs {
        if !current.is_empty() && current.chars().count() + paragraph.chars().count() > MAX_CHUNK_CHARS
        {
            push_chunk(&mut chunks, std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&paragraph);
    }
    if !current.is_empty() {
        push_chunk(&mut chunks, current);
    }
    Ok(chunks)
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: String) {
    let number = chunks.len() as u16 + 1;
    chunks.push(TextChunk {
        number,
        id: format!("c{number:04}"),
        text,
    });
}

fn chunk_fingerprint(chunk: &TextChunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.id.as_bytes());
    hasher.update([0x1f]);
    hasher.update(clean_text(&chunk.text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Translate chunks with bounded parallelism and checkpointed resume.
/// Returns chunk translations in chunk order.
pub async fn translate_chunks<B: TranslateBackend + 'static>(
    backend: Arc<B>,
    store: Arc<CheckpointStore>,
    gate: Arc<RateGate>,
    policy: BatchPolicy,
    chunks: Vec<TextChunk>,
    target_lang: String,
    resume: bool,
    workers: usize,
    cancel: tokio_util::sync::CancellationToken,
) -> PipelineResult<(Vec<TranslatedTextItem>, RunSummary)> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut join_set = JoinSet::new();

    for chunk in chunks {
        let backend = Arc::clone(&backend);
        let store = Arc::clone(&store);
        let gate = Arc::clone(&gate);
        let policy = policy.clone();
        let target_lang = target_lang.clone();
        let cancel = cancel.clone();
        let semaphore = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(PipelineError::Cancelled),
            };
            process_chunk(
                backend.as_ref(),
                &store,
                &gate,
                &policy,
                chunk,
                &target_lang,
                resume,
                &cancel,
            )
            .await
        });
    }

    let mut summary = RunSummary::default();
    let mut items: Vec<(u16, TranslatedTextItem, bool, PageStatus)> = Vec::new();
    let mut fatal: Option<PipelineError> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(outcome)) => items.push(outcome),
            Ok(Err(e)) => {
                if fatal.is_none() {
                    cancel.cancel();
                    fatal = Some(e);
                }
            }
            Err(join_error) => {
                if fatal.is_none() {
                    cancel.cancel();
                    fatal = Some(PipelineError::Internal {
                        message: format!("chunk worker panicked: {join_error}"),
                    });
                }
            }
        }
    }
    if let Some(e) = fatal {
        return Err(e);
    }

    items.sort_by_key(|(number, ..)| *number);
    let mut ordered = Vec::with_capacity(items.len());
    for (_, item, from_cache, status) in items {
        summary.total_pages += 1;
        match status {
            PageStatus::Success => summary.succeeded += 1,
            PageStatus::Failed => summary.failed += 1,
            PageStatus::Pending => {}
        }
        if from_cache {
            summary.resumed_from_cache += 1;
        } else if status == PageStatus::Success {
            summary.translated_blocks += 1;
        }
        ordered.push(item);
    }
    Ok((ordered, summary))
}

#[allow(clippy::too_many_arguments)]
async fn process_chunk<B: TranslateBackend>(
    backend: &B,
    store: &CheckpointStore,
    gate: &RateGate,
    policy: &BatchPolicy,
    chunk: TextChunk,
    target_lang: &str,
    resume: bool,
    cancel: &tokio_util::sync::CancellationToken,
) -> PipelineResult<(u16, TranslatedTextItem, bool, PageStatus)> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let fingerprint = chunk_fingerprint(&chunk);

    if resume
        && let Some(cached) = store.page_checkpoint(chunk.number)
        && let Some(item) = cached
            .items
            .iter()
            .find(|i| i.block_id == chunk.id && clean_text(&i.original_text) == clean_text(&chunk.text))
    {
        store.set_page_status(chunk.number, PageStatus::Success, &fingerprint, None)?;
        return Ok((chunk.number, item.clone(), true, PageStatus::Success));
    }

    let request = vec![BlockRequest {
        id: chunk.id.clone(),
        text: chunk.text.clone(),
    }];
    match translate_blocks(backend, gate, policy, request, target_lang, None, cancel).await {
        Ok(mut translated) => {
            let item = translated.pop().unwrap_or(TranslatedTextItem {
                block_id: chunk.id.clone(),
                original_text: chunk.text.clone(),
                translated_text: chunk.text.clone(),
            });
            store.write_page_checkpoint(&PageCheckpoint {
                page_number: chunk.number,
                fingerprint: fingerprint.clone(),
                items: vec![item.clone()],
                updated_at: Utc::now(),
            })?;
            store.set_page_status(chunk.number, PageStatus::Success, &fingerprint, None)?;
            Ok((chunk.number, item, false, PageStatus::Success))
        }
        Err(TranslateError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) if e.is_fatal() => {
            store.set_page_status(
                chunk.number,
                PageStatus::Failed,
                &fingerprint,
                Some(e.to_string()),
            )?;
            Err(e.into())
        }
        Err(e) => {
            warn!(chunk = chunk.number, error = %e, "Chunk quarantined after translation failure");
            store.set_page_status(
                chunk.number,
                PageStatus::Failed,
                &fingerprint,
                Some(e.to_string()),
            )?;
            Ok((
                chunk.number,
                TranslatedTextItem {
                    block_id: chunk.id.clone(),
                    original_text: chunk.text.clone(),
                    translated_text: chunk.text,
                },
                false,
                PageStatus::Failed,
            ))
        }
    }
}

/// Write the translated chunks as a plain-text sidecar.
pub fn write_output(path: &Path, items: &[TranslatedTextItem]) -> std::io::Result<()> {
    let body = items
        .iter()
        .map(|i| i.translated_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    std::fs::write(path, body)?;
    info!(path = %path.display(), chunks = items.len(), "Flat-text output written");
    Ok(())
}
