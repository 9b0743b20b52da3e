use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod checkpoint;
mod cli;
mod config;
mod error;
mod extract;
mod geometry;
mod model;
mod pages;
mod pdfio;
mod pipeline;
mod plaintext;
mod render;
mod translate;

use crate::checkpoint::{CheckpointStore, LAYOUT_RUNS_DIR, TEXT_RUNS_DIR};
use crate::cli::Cli;
use crate::config::AppConfig;
use crate::error::{ExtractError, PipelineError, PipelineResult, RenderError};

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            error!(
                failed_units = failed,
                "Run finished with failed pages; re-run with --resume to retry them"
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Run aborted");
            ExitCode::FAILURE
        }
    }
}

/// Execute one run; returns the number of units that ended non-`Success`.
async fn run(cli: Cli) -> PipelineResult<usize> {
    let mut config = AppConfig::load()?;
    if let Some(workers) = cli.workers {
        config.translation.workers = workers.max(1);
    }
    if let Some(provider) = &cli.provider {
        config.translation.provider = provider.clone();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        input = %cli.input.display(),
        target = %cli.target_lang,
        provider = %config.translation.provider,
        "Starting translation run"
    );

    let selection = pages::PageSelection::from_option(cli.pages.as_deref())?;
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let pdfium = pdfio::create_pdfium()?;
    let document = pdfio::load_document(&pdfium, &cli.input)?;
    let page_count = document.pages().len();
    info!(pages = page_count, "Document loaded");

    std::fs::create_dir_all(&cli.output_dir)?;
    let stem = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string();
    let source_key = cli.input.to_string_lossy().to_string();

    let backend = Arc::new(translate::Provider::from_config(&config.translation)?);
    let gate = Arc::new(translate::RateGate::new(
        config.translation.min_request_interval_ms,
    ));
    let policy = translate::BatchPolicy::from(&config.translation);

    if cli.text_only {
        let store = Arc::new(CheckpointStore::open(
            &config.checkpoint.root,
            TEXT_RUNS_DIR,
            &source_key,
            &cli.target_lang,
            &config.translation.provider,
        )?);
        let chunks = plaintext::chunk_document(&document, &selection)?;
        if chunks.is_empty() {
            return Err(ExtractError::EmptySelection { total: page_count }.into());
        }
        info!(chunks = chunks.len(), run = %store.run_hash(), "Document chunked");
        drop(document);

        let (items, summary) = plaintext::translate_chunks(
            backend,
            store,
            gate,
            policy,
            chunks,
            cli.target_lang.clone(),
            cli.resume,
            config.translation.workers,
            cancel,
        )
        .await?;

        let out_path = cli.output_dir.join(format!("{stem}.{}.txt", cli.target_lang));
        plaintext::write_output(&out_path, &items)?;
        info!(
            chunks = summary.total_pages,
            succeeded = summary.succeeded,
            failed = summary.failed,
            from_cache = summary.resumed_from_cache,
            "Flat-text run complete"
        );
        return Ok(summary.failed);
    }

    // Layout mode. Extraction runs sequentially up front; the document
    // handle is released before the concurrent phase.
    let extractor = extract::PageExtractor::new(&config.extraction);
    let mut page_objects = Vec::new();
    for (index, page) in document.pages().iter().enumerate() {
        let page_number = index as u16 + 1;
        if !selection.contains(page_number) {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let extracted =
            extractor.extract_page(&pdfium, &document, &page, index as u16, page_number)?;
        page_objects.push(extracted);
    }
    if page_objects.is_empty() {
        return Err(ExtractError::EmptySelection { total: page_count }.into());
    }
    let total_blocks: usize = page_objects.iter().map(|p| p.text_blocks.len()).sum();
    info!(
        pages = page_objects.len(),
        blocks = total_blocks,
        "Extraction complete"
    );
    drop(document);

    let store = Arc::new(CheckpointStore::open(
        &config.checkpoint.root,
        LAYOUT_RUNS_DIR,
        &source_key,
        &cli.target_lang,
        &config.translation.provider,
    )?);
    info!(run = %store.run_hash(), resume = cli.resume, "Checkpoint store ready");

    let ocr = match config.ocr.enabled {
        true => Some(Arc::new(translate::OcrClient::new(config.ocr.clone())?)),
        false => None,
    };

    let ctx = Arc::new(pipeline::PageWorkContext {
        backend,
        store: Arc::clone(&store),
        gate,
        policy,
        ocr,
        options: pipeline::RunOptions {
            target_lang: cli.target_lang.clone(),
            resume: cli.resume,
            force: cli.force,
            workers: config.translation.workers,
            send_page_context: config.translation.send_page_context,
        },
        cancel: cancel.clone(),
    });

    let (translated_pages, summary) = pipeline::translate_pages(ctx, page_objects).await?;

    let reconstructor = render::Reconstructor::new(&pdfium, &config.render);
    let output = reconstructor.reconstruct(&translated_pages)?;
    let out_path = cli.output_dir.join(format!("{stem}.{}.pdf", cli.target_lang));
    output
        .save_to_file(&out_path)
        .map_err(|e| RenderError::Save {
            path: out_path.clone(),
            message: format!("{e:?}"),
        })?;

    info!(
        path = %out_path.display(),
        pages = summary.total_pages,
        succeeded = summary.succeeded,
        failed = summary.failed,
        from_cache = summary.resumed_from_cache,
        translated_blocks = summary.translated_blocks,
        "Run complete"
    );
    Ok(summary.failed)
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run; checkpoints written so far remain valid");
            cancel.cancel();
        }
    });
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format().with_target(true).compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("polyglot_pdf=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
