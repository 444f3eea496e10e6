//! Bulk ingestion: run many documents through the sync engine with
//! bounded concurrency, a resumable progress checkpoint, and an abort
//! guard against systemic failure.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::sync::SyncEngine;
use crate::types::Document;

/// Checkpoint persisted after every completed document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Progress {
    /// Latest document id with all earlier input positions also succeeded.
    pub last_doc_id: Option<String>,
    pub docs_processed: usize,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    pub failures: usize,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl Progress {
    pub async fn load(path: &Path) -> Option<Self> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        serde_json::from_str(&raw).ok()
    }

    pub async fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Skip documents at or before the checkpoint cursor.
    pub resume: bool,
    pub limit: Option<usize>,
    /// Abort the whole run after this many failures in a row.
    pub max_consecutive_failures: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            resume: false,
            limit: None,
            max_consecutive_failures: 5,
        }
    }
}

/// Totals for one ingest run.
#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub chunks_created: usize,
    pub chunks_embedded: usize,
    /// True when the consecutive-failure guard stopped the run early.
    pub aborted: bool,
}

/// Drives bulk document ingestion through the sync engine.
pub struct IngestRunner {
    engine: Arc<SyncEngine>,
    progress_path: PathBuf,
    max_concurrency: usize,
}

impl IngestRunner {
    pub fn new(engine: Arc<SyncEngine>, progress_path: PathBuf, max_concurrency: usize) -> Self {
        Self {
            engine,
            progress_path,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        documents: Vec<Document>,
        options: &IngestOptions,
    ) -> Result<IngestSummary, PipelineError> {
        let mut progress = if options.resume {
            Progress::load(&self.progress_path).await.unwrap_or_default()
        } else {
            Progress::default()
        };

        let mut documents = documents;
        if options.resume {
            if let Some(cursor) = progress.last_doc_id.clone() {
                if let Some(pos) = documents.iter().position(|d| d.id == cursor) {
                    info!(cursor = %cursor, skipped = pos + 1, "resuming after checkpoint");
                    documents.drain(..=pos);
                }
            }
        }
        if let Some(limit) = options.limit {
            documents.truncate(limit);
        }
        info!(
            documents = documents.len(),
            concurrency = self.max_concurrency,
            "starting ingest run"
        );

        let total = documents.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        for (position, doc) in documents.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let engine = self.engine.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = engine.sync_document(&doc).await;
                (position, doc.id, doc.title, outcome)
            });
        }

        let mut summary = IngestSummary::default();
        let mut consecutive_failures = 0;
        // Completion arrives out of order; the checkpoint cursor only
        // advances over a contiguous prefix of successes. `None` marks a
        // failed position, which pins the cursor so resume retries it.
        let mut done: BTreeMap<usize, Option<String>> = BTreeMap::new();
        let mut cursor_position = 0;

        while let Some(joined) = tasks.join_next().await {
            let (position, doc_id, title, outcome) = match joined {
                Ok(completed) => completed,
                Err(err) => {
                    error!(error = %err, "ingest worker panicked");
                    summary.failed += 1;
                    consecutive_failures += 1;
                    continue;
                }
            };

            let succeeded = outcome.is_ok();
            match outcome {
                Ok(outcome) => {
                    summary.processed += 1;
                    summary.chunks_created += outcome.created;
                    summary.chunks_embedded += outcome.embedded;
                    if outcome.skipped_reason.is_some() {
                        summary.skipped += 1;
                    }
                    progress.docs_processed += 1;
                    progress.chunks_created += outcome.created;
                    progress.chunks_embedded += outcome.embedded;
                    consecutive_failures = 0;
                }
                Err(err) => {
                    error!(document = %title, error = %err, "document sync failed");
                    summary.failed += 1;
                    progress.failures += 1;
                    consecutive_failures += 1;
                }
            }

            done.insert(position, succeeded.then_some(doc_id));
            while let Some(Some(_)) = done.get(&cursor_position) {
                if let Some(Some(id)) = done.remove(&cursor_position) {
                    progress.last_doc_id = Some(id);
                }
                cursor_position += 1;
            }
            progress.last_run_at = Some(Utc::now());
            if let Err(err) = progress.save(&self.progress_path).await {
                warn!(error = %err, "failed to write progress checkpoint");
            }

            if consecutive_failures >= options.max_consecutive_failures {
                error!(
                    failures = consecutive_failures,
                    "too many consecutive failures, aborting run"
                );
                summary.aborted = true;
                tasks.abort_all();
                break;
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            total,
            aborted = summary.aborted,
            "ingest run finished"
        );
        Ok(summary)
    }
}
