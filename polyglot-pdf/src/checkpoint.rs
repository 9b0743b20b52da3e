//! Durable per-run, per-page translation checkpoints.
//!
//! Layout: `{root}/layout-runs/{run_hash}/manifest.json` plus
//! `{root}/layout-runs/{run_hash}/pages/page-{NNNN}.json`. Every file is
//! written to a temp file and renamed into place, so a crash mid-write never
//! leaves a corrupt but readable checkpoint. Read failures are downgraded to
//! cache misses; write failures always propagate.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::CheckpointError;
use crate::model::TranslatedTextItem;

/// Subdirectory for layout-mode runs.
pub const LAYOUT_RUNS_DIR: &str = "layout-runs";

/// Subdirectory for flat-text-mode runs.
pub const TEXT_RUNS_DIR: &str = "text-runs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Pending,
    Success,
    Failed,
}

/// Per-page entry in the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    pub status: PageStatus,
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Run-level status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_hash: String,
    pub source_path: String,
    pub target_language: String,
    pub provider: String,
    #[serde(default)]
    pub pages: BTreeMap<u16, PageEntry>,
}

/// One page's (or chunk's) translated items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageCheckpoint {
    pub page_number: u16,
    pub fingerprint: String,
    pub items: Vec<TranslatedTextItem>,
    pub updated_at: DateTime<Utc>,
}

/// Content hash identifying a run: same source, target language, and
/// provider resume from the same checkpoint tree.
pub fn run_hash(source_path: &str, target_language: &str, provider: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update([0x1f]);
    hasher.update(target_language.as_bytes());
    hasher.update([0x1f]);
    hasher.update(provider.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

pub struct CheckpointStore {
    run_dir: PathBuf,
    manifest: Mutex<RunManifest>,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint tree for one run. An unreadable
    /// manifest is treated as absent.
    pub fn open(
        root: &Path,
        runs_dir: &str,
        source_path: &str,
        target_language: &str,
        provider: &str,
    ) -> Result<Self, CheckpointError> {
        let hash = run_hash(source_path, target_language, provider);
        let run_dir = root.join(runs_dir).join(&hash);
        let pages_dir = run_dir.join("pages");
        fs::create_dir_all(&pages_dir).map_err(|e| CheckpointError::CreateDir {
            path: pages_dir,
            source: e,
        })?;

        let manifest_path = run_dir.join("manifest.json");
        let manifest = match fs::read(&manifest_path) {
            Ok(bytes) => match serde_json::from_slice::<RunManifest>(&bytes) {
                Ok(manifest) => {
                    debug!(run = %hash, pages = manifest.pages.len(), "Loaded existing run manifest");
                    manifest
                }
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "Unreadable manifest, starting fresh");
                    Self::fresh_manifest(hash, source_path, target_language, provider)
                }
            },
            Err(_) => Self::fresh_manifest(hash, source_path, target_language, provider),
        };

        Ok(Self {
            run_dir,
            manifest: Mutex::new(manifest),
        })
    }

    fn fresh_manifest(
        run_hash: String,
        source_path: &str,
        target_language: &str,
        provider: &str,
    ) -> RunManifest {
        RunManifest {
            run_hash,
            source_path: source_path.to_string(),
            target_language: target_language.to_string(),
            provider: provider.to_string(),
            pages: BTreeMap::new(),
        }
    }

    pub fn run_hash(&self) -> String {
        self.lock_manifest().run_hash.clone()
    }

    /// Read a page checkpoint. Any failure is a cache miss.
    pub fn page_checkpoint(&self, page_number: u16) -> Option<PageCheckpoint> {
        let path = self.page_path(page_number);
        let bytes = fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(checkpoint) => Some(checkpoint),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable page checkpoint, treating as miss");
                None
            }
        }
    }

    /// Persist a page checkpoint atomically.
    pub fn write_page_checkpoint(&self, checkpoint: &PageCheckpoint) -> Result<(), CheckpointError> {
        self.write_json_atomic(&self.page_path(checkpoint.page_number), checkpoint)
    }

    /// Update a page's manifest entry and persist the manifest atomically.
    pub fn set_page_status(
        &self,
        page_number: u16,
        status: PageStatus,
        fingerprint: &str,
        error: Option<String>,
    ) -> Result<(), CheckpointError> {
        let snapshot = {
            let mut manifest = self.lock_manifest();
            manifest.pages.insert(
                page_number,
                PageEntry {
                    status,
                    fingerprint: fingerprint.to_string(),
                    error,
                    updated_at: Utc::now(),
                },
            );
            manifest.clone()
        };
        self.write_json_atomic(&self.run_dir.join("manifest.json"), &snapshot)
    }

    pub fn page_status(&self, page_number: u16) -> Option<PageStatus> {
        self.lock_manifest()
            .pages
            .get(&page_number)
            .map(|e| e.status)
    }

    fn page_path(&self, page_number: u16) -> PathBuf {
        self.run_dir
            .join("pages")
            .join(format!("page-{page_number:04}.json"))
    }

    fn lock_manifest(&self) -> std::sync::MutexGuard<'_, RunManifest> {
        self.manifest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_json_atomic<T: Serialize>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), CheckpointError> {
        let dir = path.parent().unwrap_or(&self.run_dir);
        let mut temp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| CheckpointError::Write {
                path: path.to_path_buf(),
                source: e,
            })?;
        serde_json::to_writer_pretty(&mut temp, value).map_err(CheckpointError::Serialize)?;
        temp.persist(path).map_err(|e| CheckpointError::Write {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }
}
