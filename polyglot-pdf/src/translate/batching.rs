//! Batch planning and adaptive splitting.
//!
//! Blocks are packed into batches bounded by both a block count and a
//! character budget. A batch whose response is truncated, under-covered, or
//! unparseable is bisected and each half retried independently, through an
//! explicit work queue so pathological providers cannot grow the stack.
//! A singleton that still fails is a hard failure for that block only: it
//! is logged, left uncovered, and falls back to its original text.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::TranslationConfig;
use crate::error::TranslateError;
use crate::model::TranslatedTextItem;

use super::provider::{BatchRequest, BatchResponse, BlockRequest, TranslateBackend};
use super::rate_limit::RateGate;

/// Client-side resilience policy.
#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub max_blocks: usize,
    pub max_chars: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_expansion_ratio: f32,
}

impl From<&TranslationConfig> for BatchPolicy {
    fn from(config: &TranslationConfig) -> Self {
        Self {
            max_blocks: config.max_batch_blocks.max(1),
            max_chars: config.max_batch_chars.max(1),
            max_retries: config.max_retries.max(1),
            retry_backoff_ms: config.retry_backoff_ms,
            max_expansion_ratio: config.max_expansion_ratio,
        }
    }
}

/// Translate a set of blocks, covering as many ids as possible.
///
/// Returns items in input-block order. Ids missing from the result had a
/// singleton-level hard failure and fall back to their original text at
/// application time. Fatal and terminal errors propagate.
pub async fn translate_blocks<B: TranslateBackend>(
    backend: &B,
    gate: &RateGate,
    policy: &BatchPolicy,
    blocks: Vec<BlockRequest>,
    target_lang: &str,
    context_pdf: Option<Arc<Vec<u8>>>,
    cancel: &CancellationToken,
) -> Result<Vec<TranslatedTextItem>, TranslateError> {
    let input_order: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    let mut results: HashMap<String, TranslatedTextItem> = HashMap::new();
    let mut queue: VecDeque<Vec<BlockRequest>> = plan_batches(blocks, policy);

    while let Some(mut batch) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(TranslateError::Cancelled);
        }

        let request = BatchRequest {
            blocks: batch.clone(),
            target_lang: target_lang.to_string(),
            context_pdf: context_pdf.clone(),
        };

        match request_with_retry(backend, gate, policy, request, cancel).await {
            Ok(response) => {
                let items = validate_items(response.items, &batch, policy);
                let fully_covered = items.len() == batch.len();

                if response.truncated || !fully_covered {
                    if batch.len() > 1 {
                        debug!(
                            blocks = batch.len(),
                            covered = items.len(),
                            truncated = response.truncated,
                            "Bisecting under-covered batch"
                        );
                        let tail = batch.split_off(batch.len() / 2);
                        queue.push_back(batch);
                        queue.push_back(tail);
                    } else if let Some(item) = items.into_iter().next() {
                        // Truncation marker but the one block is covered:
                        // take what we got.
                        results.insert(item.block_id.clone(), item);
                    } else {
                        warn!(
                            block = %batch[0].id,
                            "Block failed translation after exhausting splits; keeping original text"
                        );
                    }
                } else {
                    for item in items {
                        results.insert(item.block_id.clone(), item);
                    }
                }
            }
            Err(e) if splittable(&e) => {
                if batch.len() > 1 {
                    debug!(blocks = batch.len(), error = %e, "Bisecting batch after malformed response");
                    let tail = batch.split_off(batch.len() / 2);
                    queue.push_back(batch);
                    queue.push_back(tail);
                } else {
                    warn!(block = %batch[0].id, error = %e, "Unparseable singleton response; keeping original text");
                }
            }
            Err(e) => return Err(e),
        }
    }

    Ok(input_order
        .into_iter()
        .filter_map(|id| results.remove(&id))
        .collect())
}

/// Greedy packing under both batch bounds. An oversized single block still
/// gets its own batch.
fn plan_batches(blocks: Vec<BlockRequest>, policy: &BatchPolicy) -> VecDeque<Vec<BlockRequest>> {
    let mut batches = VecDeque::new();
    let mut current: Vec<BlockRequest> = Vec::new();
    let mut current_chars = 0usize;

    for block in blocks {
        let chars = block.text.chars().count();
        if !current.is_empty()
            && (current.len() >= policy.max_blocks || current_chars + chars > policy.max_chars)
        {
            batches.push_back(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += chars;
        current.push(block);
    }
    if !current.is_empty() {
        batches.push_back(current);
    }
    batches
}

async fn request_with_retry<B: TranslateBackend>(
    backend: &B,
    gate: &RateGate,
    policy: &BatchPolicy,
    request: BatchRequest,
    cancel: &CancellationToken,
) -> Result<BatchResponse, TranslateError> {
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(TranslateError::Cancelled);
        }
        gate.wait().await;

        match backend.translate_batch(request.clone()).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() => {
                attempts += 1;
                if attempts >= policy.max_retries {
                    return Err(TranslateError::RetriesExhausted {
                        attempts,
                        source: Box::new(e),
                    });
                }
                let backoff =
                    Duration::from_millis(policy.retry_backoff_ms << (attempts - 1).min(6));
                warn!(attempt = attempts, backoff_ms = backoff.as_millis() as u64, error = %e, "Transient provider failure, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(TranslateError::Cancelled),
                    _ = sleep(backoff) => {}
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Structural validation of response items: one item per requested id,
/// non-empty, no runaway expansion. Failing items count as uncovered so the
/// splitter re-requests them.
fn validate_items(
    items: Vec<TranslatedTextItem>,
    batch: &[BlockRequest],
    policy: &BatchPolicy,
) -> Vec<TranslatedTextItem> {
    let mut seen: HashMap<String, TranslatedTextItem> = HashMap::new();
    for item in items {
        if !batch.iter().any(|b| b.id == item.block_id) {
            continue;
        }
        if item.translated_text.trim().is_empty() {
            warn!(block = %item.block_id, "Discarding empty translation");
            continue;
        }
        let original_len = item.original_text.chars().count().max(8) as f32;
        let translated_len = item.translated_text.chars().count() as f32;
        if translated_len > policy.max_expansion_ratio * original_len {
            warn!(
                block = %item.block_id,
                ratio = translated_len / original_len,
                "Discarding runaway translation expansion"
            );
            continue;
        }
        seen.entry(item.block_id.clone()).or_insert(item);
    }
    seen.into_values().collect()
}

/// Malformed provider output is split before it becomes a failure.
fn splittable(error: &TranslateError) -> bool {
    matches!(error, TranslateError::InvalidResponse { .. })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::sync::Mutex;

    /// Backend scripted per call; records every request it sees.
    struct ScriptedBackend<F>
    where
        F: Fn(&BatchRequest, u32) -> Result<BatchResponse, TranslateError> + Send + Sync,
    {
        script: F,
        calls: Mutex<u32>,
        batch_sizes: Mutex<Vec<usize>>,
    }

    impl<F> ScriptedBackend<F>
    where
        F: Fn(&BatchRequest, u32) -> Result<BatchResponse, TranslateError> + Send + Sync,
    {
        fn new(script: F) -> Self {
            Self {
                script,
                calls: Mutex::new(0),
                batch_sizes: Mutex::new(Vec::new()),
            }
        }
    }

    impl<F> TranslateBackend for ScriptedBackend<F>
    where
        F: Fn(&BatchRequest, u32) -> Result<BatchResponse, TranslateError> + Send + Sync,
    {
        fn translate_batch(
            &self,
            request: BatchRequest,
        ) -> impl Future<Output = Result<BatchResponse, TranslateError>> + Send {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                *calls
            };
            self.batch_sizes.lock().unwrap().push(request.blocks.len());
            let result = (self.script)(&request, call);
            async move { result }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn blocks(n: usize) -> Vec<BlockRequest> {
        (0..n)
            .map(|i| BlockRequest {
                id: format!("b{i}"),
                text: format!("text {i}"),
            })
            .collect()
    }

    fn echo_items(request: &BatchRequest) -> Vec<TranslatedTextItem> {
        request
            .blocks
            .iter()
            .map(|b| TranslatedTextItem {
                block_id: b.id.clone(),
                original_text: b.text.clone(),
                translated_text: format!("XL {}", b.text),
            })
            .collect()
    }

    fn policy() -> BatchPolicy {
        BatchPolicy {
            max_blocks: 4,
            max_chars: 10_000,
            max_retries: 3,
            retry_backoff_ms: 1,
            max_expansion_ratio: 6.0,
        }
    }

    #[test]
    fn test_plan_batches_respects_both_bounds() {
        let p = BatchPolicy {
            max_blocks: 3,
            max_chars: 100,
            ..policy()
        };
        let batches = plan_batches(blocks(7), &p);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= 3));

        let p = BatchPolicy {
            max_blocks: 100,
            max_chars: 15,
            ..policy()
        };
        // "text N" is 6 chars: two per 15-char batch.
        let batches = plan_batches(blocks(4), &p);
        assert_eq!(batches.len(), 2);
    }

    #[tokio::test]
    async fn test_happy_path_returns_input_order() {
        let backend = ScriptedBackend::new(|req, _| {
            Ok(BatchResponse {
                items: echo_items(req),
                truncated: false,
            })
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(6),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.block_id.as_str()).collect();
        assert_eq!(ids, ["b0", "b1", "b2", "b3", "b4", "b5"]);
    }

    #[tokio::test]
    async fn test_always_truncating_provider_splits_to_singletons() {
        // Truncates every multi-block batch; succeeds on singletons.
        let backend = ScriptedBackend::new(|req, _| {
            if req.blocks.len() > 1 {
                Ok(BatchResponse {
                    items: Vec::new(),
                    truncated: true,
                })
            } else {
                Ok(BatchResponse {
                    items: echo_items(req),
                    truncated: false,
                })
            }
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(4),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 4);
        let sizes = backend.batch_sizes.lock().unwrap();
        assert_eq!(sizes.iter().filter(|&&s| s == 1).count(), 4);
    }

    #[tokio::test]
    async fn test_truncating_singleton_is_one_skipped_block_not_an_error() {
        let backend = ScriptedBackend::new(|req, _| {
            if req.blocks.iter().any(|b| b.id == "b2") {
                Ok(BatchResponse {
                    items: Vec::new(),
                    truncated: true,
                })
            } else {
                Ok(BatchResponse {
                    items: echo_items(req),
                    truncated: false,
                })
            }
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(4),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        // b2 falls back to original text by omission; everything else covered.
        assert_eq!(items.len(), 3);
        assert!(!items.iter().any(|i| i.block_id == "b2"));
    }

    #[tokio::test]
    async fn test_transient_errors_retry_then_succeed() {
        let backend = ScriptedBackend::new(|req, call| {
            if call < 3 {
                Err(TranslateError::Http {
                    status: 503,
                    message: "unavailable".to_string(),
                })
            } else {
                Ok(BatchResponse {
                    items: echo_items(req),
                    truncated: false,
                })
            }
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(2),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(*backend.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_propagates() {
        let backend = ScriptedBackend::new(|_, _| {
            Err(TranslateError::Http {
                status: 503,
                message: "unavailable".to_string(),
            })
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let err = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(2),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranslateError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_immediate() {
        let backend = ScriptedBackend::new(|_, _| {
            Err(TranslateError::QuotaExhausted {
                status: 402,
                message: "quota".to_string(),
            })
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let err = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(2),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TranslateError::QuotaExhausted { .. }));
        assert_eq!(*backend.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_output_splits_before_failing() {
        let backend = ScriptedBackend::new(|req, _| {
            if req.blocks.len() > 1 {
                Err(TranslateError::InvalidResponse {
                    message: "prose".to_string(),
                })
            } else {
                Ok(BatchResponse {
                    items: echo_items(req),
                    truncated: false,
                })
            }
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(4),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_validation_discards_runaway_expansion() {
        let backend = ScriptedBackend::new(|req, _| {
            let items = req
                .blocks
                .iter()
                .map(|b| TranslatedTextItem {
                    block_id: b.id.clone(),
                    original_text: b.text.clone(),
                    translated_text: if b.id == "b0" {
                        "garbage ".repeat(100)
                    } else {
                        format!("XL {}", b.text)
                    },
                })
                .collect();
            Ok(BatchResponse {
                items,
                truncated: false,
            })
        });
        let gate = RateGate::new(0);
        let cancel = CancellationToken::new();
        let items = translate_blocks(
            &backend,
            &gate,
            &policy(),
            blocks(2),
            "fr",
            None,
            &cancel,
        )
        .await
        .unwrap();
        // b0's expansion is discarded every time it is re-requested, so it
        // ends uncovered; b1 is fine.
        assert!(items.iter().any(|i| i.block_id == "b1"));
        assert!(!items.iter().any(|i| i.block_id == "b0"));
    }
}
