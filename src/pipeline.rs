// src/pipeline.rs
// Linear ingestion flow: resolve -> status(processing) -> fetch -> extract
// -> split -> chunk -> embed -> persist -> status(done|error).

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

use crate::chunker::SemanticChunker;
use crate::db::documents::{ChunkRow, DocumentStatus, DocumentStore, StoreError};
use crate::embedder::EmbeddingProvider;
use crate::extractor::TextExtractor;
use crate::fetcher::{fetch_object, StorageClient};
use crate::source::{self, SourceTarget, Visibility};
use crate::splitter::{split_windows, MAX_WINDOW_CHARS};

/// Document-level failure taxonomy. Per-window chunk validation failures are
/// recovered inside the chunker and never reach this enum.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Document {0} is already processing")]
    AlreadyProcessing(String),
    #[error("{0}")]
    Upstream(String),
    #[error("Embedding count {got} does not match chunk count {expected}")]
    EmbeddingMismatch { expected: usize, got: usize },
    #[error("{0}")]
    Persistence(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        PipelineError::Persistence(err.to_string())
    }
}

/// Outcome of a successful run, echoed in the trigger response.
#[derive(Debug, Clone, Copy)]
pub struct PipelineReport {
    pub extracted_text_length: usize,
    pub chunks_inserted: usize,
}

/// The ingestion pipeline with its collaborators injected explicitly; no
/// module-scope clients.
pub struct Pipeline {
    storage: Arc<dyn StorageClient>,
    extractor: Arc<dyn TextExtractor>,
    chunker: SemanticChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    store: DocumentStore,
    max_window_chars: usize,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn StorageClient>,
        extractor: Arc<dyn TextExtractor>,
        chunker: SemanticChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        store: DocumentStore,
    ) -> Self {
        Self {
            storage,
            extractor,
            chunker,
            embedder,
            store,
            max_window_chars: MAX_WINDOW_CHARS,
        }
    }

    /// Overrides the window length. Tests use small windows to exercise the
    /// multi-window path.
    pub fn with_max_window_chars(mut self, max_chars: usize) -> Self {
        self.max_window_chars = max_chars;
        self
    }

    /// Runs the whole pipeline for one document. Exactly one status
    /// transition pair happens per run: processing at the start, then done
    /// (inside the finalize transaction) or error.
    pub async fn run(
        &self,
        document_id: &str,
        visibility: Visibility,
    ) -> Result<PipelineReport, PipelineError> {
        if document_id.trim().is_empty() {
            return Err(PipelineError::Input("documentId is required".to_string()));
        }

        let target = source::resolve(visibility);

        let row = self
            .store
            .get_document(target, document_id)?
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "Document {} not found in {}",
                    document_id, target.table
                ))
            })?;
        let path = row
            .storage_path
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                PipelineError::NotFound(format!(
                    "Document {} has no {}",
                    document_id, target.path_field
                ))
            })?;

        if !self.store.try_mark_processing(target, document_id)? {
            return Err(PipelineError::AlreadyProcessing(document_id.to_string()));
        }

        match self.run_inner(target, document_id, visibility, &path).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if let Err(status_err) =
                    self.store.mark_error(target, document_id, &e.to_string())
                {
                    error!(document_id, error = %status_err, "Failed to record error status");
                }
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        target: SourceTarget,
        document_id: &str,
        visibility: Visibility,
        path: &str,
    ) -> Result<PipelineReport, PipelineError> {
        info!(document_id, bucket = target.bucket, path, "Fetching document");
        let bytes = fetch_object(self.storage.as_ref(), target.bucket, path)
            .await
            .map_err(|e| PipelineError::Upstream(e.to_string()))?;

        let text = self
            .extractor
            .extract(&bytes)
            .map_err(|e| PipelineError::Upstream(e.to_string()))?;
        let extracted_text_length = text.chars().count();

        let windows = split_windows(&text, self.max_window_chars);
        info!(
            document_id,
            chars = extracted_text_length,
            windows = windows.len(),
            "Text extracted"
        );

        let chunks = self
            .chunker
            .chunk_windows(&windows)
            .await
            .map_err(|e| PipelineError::Upstream(e.to_string()))?;

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            self.embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| PipelineError::Upstream(e.to_string()))?
        };

        if embeddings.len() != chunks.len() {
            return Err(PipelineError::EmbeddingMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
            });
        }

        let scope = visibility.as_str();
        let rows: Vec<ChunkRow> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| ChunkRow::build(document_id, scope, chunk, embedding))
            .collect::<Result<_, _>>()
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        let chunks_inserted = self.store.finalize(target, document_id, scope, &rows)?;

        info!(document_id, chunks = chunks_inserted, "Document processed");
        Ok(PipelineReport {
            extracted_text_length,
            chunks_inserted,
        })
    }

    /// Lifecycle fields for the status endpoint.
    pub fn status(
        &self,
        document_id: &str,
        visibility: Visibility,
    ) -> Result<Option<DocumentStatus>, PipelineError> {
        let target = source::resolve(visibility);
        Ok(self.store.status(target, document_id)?)
    }

    /// Health probe: verifies the database connection answers.
    pub fn health_check(&self) -> Result<(), PipelineError> {
        Ok(self.store.ping()?)
    }
}
