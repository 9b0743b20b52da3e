//! Checkpointed translation orchestrator.
//!
//! Pages are dispatched with bounded parallelism; each page's work
//! (checkpoint read, translate, checkpoint write, apply) is independent and
//! runs in any interleaving. Reconstruction re-sorts by page number, so no
//! cross-page ordering is needed. Per page: `Pending → Success | Failed`.
//! Quota exhaustion and checkpoint write failures abort the run; terminal
//! provider rejections and exhausted retries quarantine the page and the run
//! continues.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::checkpoint::{CheckpointStore, PageCheckpoint, PageStatus};
use crate::error::{PipelineError, PipelineResult, TranslateError};
use crate::geometry::StyleInfo;
use crate::model::{PageObject, TextBlock, TranslatedTextItem, clean_text, text_block_id};
use crate::translate::{
    BatchPolicy, BlockRequest, OcrClient, RateGate, TranslateBackend, translate_blocks,
};

/// Font style for synthetic OCR-derived blocks.
const OCR_BLOCK_FONT_SIZE: f32 = 11.0;

/// Run-level options derived from CLI and config.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target_lang: String,
    pub resume: bool,
    pub force: bool,
    pub workers: usize,
    pub send_page_context: bool,
}

/// Everything a page worker needs, shared across tasks.
pub struct PageWorkContext<B> {
    pub backend: Arc<B>,
    pub store: Arc<CheckpointStore>,
    pub gate: Arc<RateGate>,
    pub policy: BatchPolicy,
    pub ocr: Option<Arc<OcrClient>>,
    pub options: RunOptions,
    pub cancel: CancellationToken,
}

/// Outcome of one page's processing.
pub struct PageOutcome {
    pub page: PageObject,
    pub status: PageStatus,
    pub from_cache_only: bool,
    pub translated_blocks: usize,
}

/// Aggregated run result.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub total_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub resumed_from_cache: usize,
    pub translated_blocks: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &PageOutcome) {
        self.total_pages += 1;
        match outcome.status {
            PageStatus::Success => self.succeeded += 1,
            PageStatus::Failed => self.failed += 1,
            PageStatus::Pending => {}
        }
        if outcome.from_cache_only {
            self.resumed_from_cache += 1;
        }
        self.translated_blocks += outcome.translated_blocks;
    }
}

/// Translate all pages with bounded parallelism. Returns pages sorted by
/// page number with `translated_text` filled in.
pub async fn translate_pages<B: TranslateBackend + 'static>(
    ctx: Arc<PageWorkContext<B>>,
    pages: Vec<PageObject>,
) -> PipelineResult<(Vec<PageObject>, RunSummary)> {
    let semaphore = Arc::new(Semaphore::new(ctx.options.workers.max(1)));
    let mut join_set = JoinSet::new();

    for page in pages {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return Err(PipelineError::Cancelled),
            };
            process_page(&ctx, page).await
        });
    }

    let mut summary = RunSummary::default();
    let mut completed = Vec::new();
    let mut fatal: Option<PipelineError> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(Ok(outcome)) => {
                summary.record(&outcome);
                completed.push(outcome.page);
            }
            Ok(Err(e)) => {
                // First fatal error wins; cancel the rest and drain.
                if fatal.is_none() {
                    ctx.cancel.cancel();
                    fatal = Some(e);
                }
            }
            Err(join_error) => {
                if fatal.is_none() {
                    ctx.cancel.cancel();
                    fatal = Some(PipelineError::Internal {
                        message: format!("page worker panicked: {join_error}"),
                    });
                }
            }
        }
    }

    if let Some(e) = fatal {
        return Err(e);
    }

    completed.sort_by_key(|p| p.page_number);
    Ok((completed, summary))
}

/// Process one page through the checkpoint state machine.
async fn process_page<B: TranslateBackend>(
    ctx: &PageWorkContext<B>,
    mut page: PageObject,
) -> PipelineResult<PageOutcome> {
    let page_number = page.page_number;
    if ctx.cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    if let Some(ocr) = &ctx.ocr {
        apply_ocr_fallback(ocr, &mut page).await;
    }

    let fingerprint = page.fingerprint();

    if page.text_blocks.is_empty() {
        debug!(page = page_number, "No translatable text");
        ctx.store
            .set_page_status(page_number, PageStatus::Success, &fingerprint, None)?;
        return Ok(PageOutcome {
            page,
            status: PageStatus::Success,
            from_cache_only: false,
            translated_blocks: 0,
        });
    }

    let context_pdf = ctx
        .options
        .send_page_context
        .then(|| Arc::new(page.source_pdf.clone()));

    if ctx.options.resume
        && !ctx.options.force
        && let Some(cached) = ctx.store.page_checkpoint(page_number)
    {
        // A cache hit does not require fingerprint equality: cached items
        // apply wherever they still match, the rest is re-translated.
        let plan = plan_coverage(&page, &cached.items);
        page.apply_items(&cached.items);
        page.apply_items(&plan.reused);

        if plan.uncovered.is_empty() {
            info!(page = page_number, "Page resumed entirely from checkpoint");
            ctx.store
                .set_page_status(page_number, PageStatus::Success, &fingerprint, None)?;
            return Ok(PageOutcome {
                page,
                status: PageStatus::Success,
                from_cache_only: true,
                translated_blocks: 0,
            });
        }

        info!(
            page = page_number,
            cached = cached.items.len(),
            uncovered = plan.uncovered.len(),
            "Partial cache hit, translating uncovered blocks"
        );
        let uncovered: HashSet<String> = plan.uncovered.iter().cloned().collect();
        let reduced = page.reduced_to(&uncovered);
        let new_items = match run_translation(ctx, &reduced, &fingerprint, context_pdf).await? {
            Ok(items) => items,
            Err(outcome_status) => {
                return Ok(PageOutcome {
                    page,
                    status: outcome_status,
                    from_cache_only: false,
                    translated_blocks: 0,
                });
            }
        };

        // New entries win on block id collision.
        let mut merged = merge_items(cached.items, &plan.reused);
        merged = merge_items(merged, &new_items);
        let translated = page.apply_items(&new_items);
        ctx.store.write_page_checkpoint(&PageCheckpoint {
            page_number,
            fingerprint: fingerprint.clone(),
            items: merged,
            updated_at: Utc::now(),
        })?;
        ctx.store
            .set_page_status(page_number, PageStatus::Success, &fingerprint, None)?;
        return Ok(PageOutcome {
            page,
            status: PageStatus::Success,
            from_cache_only: false,
            translated_blocks: translated,
        });
    }

    // Full translation: no usable cache, resume disabled, or forced.
    let items = match run_translation(ctx, &page, &fingerprint, context_pdf).await? {
        Ok(items) => items,
        Err(outcome_status) => {
            return Ok(PageOutcome {
                page,
                status: outcome_status,
                from_cache_only: false,
                translated_blocks: 0,
            });
        }
    };

    let translated = page.apply_items(&items);
    ctx.store.write_page_checkpoint(&PageCheckpoint {
        page_number,
        fingerprint: fingerprint.clone(),
        items,
        updated_at: Utc::now(),
    })?;
    ctx.store
        .set_page_status(page_number, PageStatus::Success, &fingerprint, None)?;

    Ok(PageOutcome {
        page,
        status: PageStatus::Success,
        from_cache_only: false,
        translated_blocks: translated,
    })
}

/// Run the translation client for a page's blocks, sorting provider errors
/// into fatal (outer `Err`), quarantine (inner `Err(PageStatus::Failed)`,
/// the run continues), and success.
async fn run_translation<B: TranslateBackend>(
    ctx: &PageWorkContext<B>,
    page: &PageObject,
    fingerprint: &str,
    context_pdf: Option<Arc<Vec<u8>>>,
) -> PipelineResult<Result<Vec<TranslatedTextItem>, PageStatus>> {
    let requests: Vec<BlockRequest> = page
        .text_blocks
        .iter()
        .map(|b| BlockRequest {
            id: b.id.clone(),
            text: b.original_text.clone(),
        })
        .collect();

    match translate_blocks(
        ctx.backend.as_ref(),
        &ctx.gate,
        &ctx.policy,
        requests,
        &ctx.options.target_lang,
        context_pdf,
        &ctx.cancel,
    )
    .await
    {
        Ok(items) => Ok(Ok(items)),
        Err(TranslateError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) if e.is_fatal() => {
            ctx.store.set_page_status(
                page.page_number,
                PageStatus::Failed,
                fingerprint,
                Some(e.to_string()),
            )?;
            Err(e.into())
        }
        Err(e) => {
            warn!(page = page.page_number, error = %e, "Page quarantined after translation failure");
            ctx.store.set_page_status(
                page.page_number,
                PageStatus::Failed,
                fingerprint,
                Some(e.to_string()),
            )?;
            Ok(Err(PageStatus::Failed))
        }
    }
}

/// For a page with no text layer but image content, ask the OCR provider
/// for a transcription and attach it as one synthetic block spanning the
/// image region. OCR failures only cost the fallback.
async fn apply_ocr_fallback(ocr: &OcrClient, page: &mut PageObject) {
    if !page.text_blocks.is_empty() || page.image_blocks.is_empty() {
        return;
    }

    let payloads: Vec<Vec<u8>> = page.image_blocks.iter().map(|i| i.bytes.clone()).collect();
    match ocr.extract_text(&payloads).await {
        Ok(Some(text)) => {
            let bbox = page
                .image_blocks
                .iter()
                .skip(1)
                .fold(page.image_blocks[0].bbox, |acc, i| acc.union(&i.bbox));
            info!(
                page = page.page_number,
                chars = text.chars().count(),
                "Using OCR fallback text"
            );
            page.text_blocks.push(TextBlock::new(
                text_block_id(page.page_number, 0),
                bbox,
                text,
                StyleInfo {
                    font_name: "Helvetica".to_string(),
                    font_size: OCR_BLOCK_FONT_SIZE,
                    color: [0.0, 0.0, 0.0],
                    bold: false,
                    italic: false,
                },
            ));
        }
        Ok(None) => {}
        Err(e) => {
            warn!(page = page.page_number, error = %e, "OCR fallback failed");
        }
    }
}

/// Cache-coverage plan for one page.
#[derive(Debug, Default)]
pub struct CoveragePlan {
    /// Block ids that need fresh translation.
    pub uncovered: Vec<String>,
    /// Cached items reusable for a block under a different id (unique,
    /// unambiguous text match), rewritten to the block's current id.
    pub reused: Vec<TranslatedTextItem>,
}

/// Decide which blocks the cached items still cover.
///
/// A block is covered when its id is cached with matching original text, or
/// when exactly one cached item elsewhere has the same cleaned text (a
/// stable block whose extraction index shifted).
pub fn plan_coverage(page: &PageObject, cached: &[TranslatedTextItem]) -> CoveragePlan {
    let by_id: HashMap<&str, &TranslatedTextItem> =
        cached.iter().map(|i| (i.block_id.as_str(), i)).collect();
    let mut by_text: HashMap<String, Vec<&TranslatedTextItem>> = HashMap::new();
    for item in cached {
        by_text
            .entry(clean_text(&item.original_text))
            .or_default()
            .push(item);
    }

    let mut plan = CoveragePlan::default();
    for block in &page.text_blocks {
        let cleaned = clean_text(&block.original_text);

        if let Some(item) = by_id.get(block.id.as_str())
            && clean_text(&item.original_text) == cleaned
        {
            continue;
        }

        match by_text.get(&cleaned).map(Vec::as_slice) {
            Some([only]) => plan.reused.push(TranslatedTextItem {
                block_id: block.id.clone(),
                original_text: block.original_text.clone(),
                translated_text: only.translated_text.clone(),
            }),
            _ => plan.uncovered.push(block.id.clone()),
        }
    }
    plan
}

/// Merge item sets; `new_items` wins on block id collision.
pub fn merge_items(
    cached: Vec<TranslatedTextItem>,
    new_items: &[TranslatedTextItem],
) -> Vec<TranslatedTextItem> {
    let mut merged: BTreeMap<String, TranslatedTextItem> = cached
        .into_iter()
        .map(|i| (i.block_id.clone(), i))
        .collect();
    for item in new_items {
        merged.insert(item.block_id.clone(), item.clone());
    }
    merged.into_values().collect()
}
