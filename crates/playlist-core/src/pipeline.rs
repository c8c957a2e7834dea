//! Export pipeline
//!
//! Resolves each playlist document, burns in its frozen annotations, merges
//! the results and hands the output to a sink. The PDF work runs on the
//! blocking pool. Jobs are not interrupted mid-way: [`ExportPipeline::cancel`]
//! and every newer export bump a generation counter, and a job that finishes
//! under an old generation drops its output instead of delivering it.

use crate::compositor::apply_to_bytes;
use crate::document::{DocumentLoader, LopdfLoader};
use crate::error::PlaylistError;
use crate::history::Snapshot;
use crate::merge::{merge_documents, MergeSource};
use crate::report::ProcessMetrics;
use crate::source::{ByteSink, DocumentId, ExportDecision, Session, SourceResolver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// One document of the playlist as it goes into an export.
#[derive(Debug, Clone)]
pub struct PlaylistEntry {
    pub id: DocumentId,
    pub annotations: Snapshot,
    /// Zero-based pages to keep, in output order. `None` keeps every page.
    pub pages: Option<Vec<usize>>,
}

impl PlaylistEntry {
    pub fn new(id: DocumentId) -> Self {
        Self {
            id,
            annotations: Snapshot::from(Vec::new()),
            pages: None,
        }
    }

    pub fn with_annotations(mut self, annotations: Snapshot) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_pages(mut self, pages: Vec<usize>) -> Self {
        self.pages = Some(pages);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExportJob {
    pub entries: Vec<PlaylistEntry>,
    pub output_name: String,
    pub decision: ExportDecision,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The user declined; nothing was resolved or composed.
    Cancelled,
    /// A newer export or an explicit cancel overtook this job.
    Superseded,
    Downloaded { name: String, metrics: ProcessMetrics },
    Uploaded { name: String, metrics: ProcessMetrics },
}

pub struct ExportPipeline {
    resolver: Arc<dyn SourceResolver>,
    sink: Arc<dyn ByteSink>,
    staged: Mutex<HashMap<DocumentId, Arc<[u8]>>>,
    generation: AtomicU64,
}

impl ExportPipeline {
    pub fn new(resolver: Arc<dyn SourceResolver>, sink: Arc<dyn ByteSink>) -> Self {
        Self {
            resolver,
            sink,
            staged: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Keep bytes for `id` so later exports skip the resolver.
    pub async fn stage(&self, id: DocumentId, bytes: impl Into<Arc<[u8]>>) {
        self.staged.lock().await.insert(id, bytes.into());
    }

    pub async fn evict(&self, id: &DocumentId) -> bool {
        self.staged.lock().await.remove(id).is_some()
    }

    /// Staged bytes for `id`, resolving and staging them on first use.
    pub async fn bytes(
        &self,
        id: &DocumentId,
        session: &Session,
    ) -> Result<Arc<[u8]>, PlaylistError> {
        if let Some(bytes) = self.staged.lock().await.get(id) {
            return Ok(bytes.clone());
        }
        let bytes: Arc<[u8]> = self.resolver.resolve(id, session).await?.into();
        self.staged.lock().await.insert(id.clone(), bytes.clone());
        Ok(bytes)
    }

    /// Page count of each document, in order, for seeding a page selection.
    pub async fn page_counts(
        &self,
        ids: &[DocumentId],
        session: &Session,
    ) -> Result<Vec<usize>, PlaylistError> {
        let mut sources = Vec::with_capacity(ids.len());
        for (index, id) in ids.iter().enumerate() {
            sources.push(self.resolve_source(index, id, session).await?);
        }

        tokio::task::spawn_blocking(move || {
            let loader = LopdfLoader;
            sources
                .iter()
                .enumerate()
                .map(|(index, bytes)| {
                    loader
                        .load(bytes)
                        .map(|doc| loader.page_count(&doc))
                        .map_err(|e| PlaylistError::SourceLoadFailure {
                            source_index: index,
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<usize>, PlaylistError>>()
        })
        .await
        .map_err(|e| PlaylistError::OperationError(format!("Page count task failed: {}", e)))?
    }

    /// Discard the result of any export still in flight.
    pub fn cancel(&self) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(generation, "export cancelled");
    }

    pub async fn export(
        &self,
        job: ExportJob,
        session: &Session,
    ) -> Result<ExportOutcome, PlaylistError> {
        if job.decision == ExportDecision::Cancel {
            tracing::debug!("export declined");
            return Ok(ExportOutcome::Cancelled);
        }
        if job.entries.is_empty() {
            return Err(PlaylistError::EmptyMergeRequest);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        tracing::info!(generation, documents = job.entries.len(), "export started");

        let mut inputs = Vec::with_capacity(job.entries.len());
        for (index, entry) in job.entries.iter().enumerate() {
            let bytes = self.resolve_source(index, &entry.id, session).await?;
            inputs.push((bytes, entry.annotations.clone(), entry.pages.clone()));
        }
        if self.is_superseded(generation) {
            return Ok(ExportOutcome::Superseded);
        }

        let input_size_bytes = inputs.iter().map(|(bytes, _, _)| bytes.len()).sum();
        let annotation_count = inputs.iter().map(|(_, annotations, _)| annotations.len()).sum();

        let (output, page_count) = tokio::task::spawn_blocking(move || compose_and_merge(inputs))
            .await
            .map_err(|e| PlaylistError::OperationError(format!("Export task failed: {}", e)))??;

        if self.is_superseded(generation) {
            tracing::info!(generation, "dropping superseded export result");
            return Ok(ExportOutcome::Superseded);
        }

        let metrics = ProcessMetrics {
            input_size_bytes,
            output_size_bytes: output.len(),
            page_count,
            annotation_count,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };
        let name = job.output_name;

        let outcome = match job.decision {
            ExportDecision::Download => {
                self.sink.download(&name, &output).await?;
                ExportOutcome::Downloaded { name, metrics }
            }
            ExportDecision::Upload => {
                self.sink.upload(&name, &output, session).await?;
                ExportOutcome::Uploaded { name, metrics }
            }
            ExportDecision::Cancel => ExportOutcome::Cancelled,
        };
        tracing::info!(generation, ?outcome, "export finished");
        Ok(outcome)
    }

    fn is_superseded(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    async fn resolve_source(
        &self,
        index: usize,
        id: &DocumentId,
        session: &Session,
    ) -> Result<Arc<[u8]>, PlaylistError> {
        self.bytes(id, session).await.map_err(|e| match e {
            PlaylistError::SessionExpired(at) => PlaylistError::SessionExpired(at),
            other => PlaylistError::SourceLoadFailure {
                source_index: index,
                reason: other.to_string(),
            },
        })
    }
}

type StagedInput = (Arc<[u8]>, Snapshot, Option<Vec<usize>>);

fn compose_and_merge(inputs: Vec<StagedInput>) -> Result<(Vec<u8>, usize), PlaylistError> {
    let mut sources = Vec::with_capacity(inputs.len());
    for (bytes, annotations, pages) in inputs {
        let composed: Arc<[u8]> = if annotations.is_empty() {
            bytes
        } else {
            apply_to_bytes(&bytes, &annotations)?.into()
        };
        sources.push(MergeSource { bytes: composed, pages });
    }

    let output = merge_documents(&sources)?;
    let loader = LopdfLoader;
    let page_count = loader.page_count(&loader.load(&output)?);
    Ok((output, page_count))
}
