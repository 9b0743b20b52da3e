//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Translate a PDF into a target language, preserving page layout.
#[derive(Parser, Debug)]
#[command(name = "polyglot-pdf", version, about)]
pub struct Cli {
    /// Input PDF path
    pub input: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "./out")]
    pub output_dir: PathBuf,

    /// Target language, e.g. "fr" or "French"
    #[arg(short = 'l', long)]
    pub target_lang: String,

    /// Page selection expression, e.g. "1,3,5-9" (default: all pages)
    #[arg(short, long)]
    pub pages: Option<String>,

    /// Resume from checkpoints written by a previous run
    #[arg(long)]
    pub resume: bool,

    /// Re-translate selected pages even when a checkpoint covers them
    #[arg(long)]
    pub force: bool,

    /// Concurrent page workers (overrides config)
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Translation provider: "ollama" or "openai" (overrides config)
    #[arg(long)]
    pub provider: Option<String>,

    /// Flat-text mode: translate plain page text to a .txt sidecar, without
    /// layout reconstruction
    #[arg(long)]
    pub text_only: bool,
}
