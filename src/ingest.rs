//! Upload pipeline.
//!
//! Coordinates the build flow: PDF bytes → page records → chunks →
//! embeddings → vector index → executive snapshot. A [`Pipeline`] holds the
//! capabilities resolved once from configuration; a
//! [`SessionState`](crate::session::SessionState) holds what the uploads
//! produce.
//!
//! The snapshot is isolated: if it fails, the freshly built index stays in
//! place and only the summary is flagged.

use std::path::PathBuf;
use std::sync::Arc;

use crate::chain::{RagChain, SummaryChain};
use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::extract::{extract_documents, extract_paths, Extraction, FileOutcome, UploadedFile};
use crate::index::{create_backend, IndexBackend};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::TextRecord;
use crate::provider::Backend;
use crate::session::{DocSummary, SessionState};

/// Resolved capabilities for one provider, model, and backend selection.
pub struct Pipeline {
    embedder: Arc<dyn Embedder>,
    backend: Box<dyn IndexBackend>,
    chunker: Chunker,
    rag: RagChain,
    summary: SummaryChain,
}

/// What one upload did.
#[derive(Debug)]
pub struct UploadReport {
    pub files: Vec<FileOutcome>,
    pub records: usize,
    pub chunks: usize,
    /// Batch number assigned to this upload.
    pub batch: u32,
    /// Chunks in the corpus after the upload.
    pub total_chunks: usize,
    pub summary: DocSummary,
}

impl UploadReport {
    pub fn failed_files(&self) -> usize {
        self.files
            .iter()
            .filter(|o| matches!(o, FileOutcome::Failed(_)))
            .count()
    }
}

impl Pipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn ChatModel>,
        backend: Box<dyn IndexBackend>,
        config: &Config,
    ) -> Result<Self> {
        let chunker = Chunker::new(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        Ok(Self {
            rag: RagChain::new(embedder.clone(), model.clone(), config.retrieval.k),
            summary: SummaryChain::new(embedder.clone(), model, config.retrieval.summary_k),
            embedder,
            backend,
            chunker,
        })
    }

    /// Resolve provider, model, key, embedder, and backend from `config`.
    ///
    /// Fails with a configuration or missing-key error before any network,
    /// model, or index call.
    pub fn from_config(config: &Config, api_key: Option<&str>) -> Result<Self> {
        let provider = config.llm.provider;
        let model = create_chat_model(provider, &config.llm.model_name(), api_key, &config.llm)?;
        let embedder = create_embedder(provider, &config.embedding, api_key)?;
        let backend = create_backend(config.index.backend, &config.index.data_dir);
        tracing::debug!(
            %provider,
            model = %model.label(),
            embedder = embedder.model_name(),
            backend = %config.index.backend,
            "pipeline ready"
        );
        Self::new(embedder, model, backend, config)
    }

    pub fn rag(&self) -> &RagChain {
        &self.rag
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub fn backend_kind(&self) -> Backend {
        self.backend.kind()
    }

    /// Load an existing corpus from the backend into an empty session.
    ///
    /// Returns `true` when a corpus was found.
    pub async fn restore(&self, session: &mut SessionState) -> Result<bool> {
        if session.corpus().is_some() {
            return Ok(true);
        }
        match self.backend.load(self.embedder.as_ref()).await? {
            Some(corpus) => {
                tracing::info!(chunks = corpus.len(), "restored corpus");
                session.set_corpus(corpus);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Extract, chunk, and index a batch of uploaded PDFs.
    pub async fn upload(
        &self,
        session: &mut SessionState,
        files: &[UploadedFile],
    ) -> Result<UploadReport> {
        if files.is_empty() {
            return Err(RagError::NoFiles);
        }
        self.index_extraction(session, extract_documents(files)).await
    }

    /// Like [`Pipeline::upload`], reading the PDFs from disk.
    ///
    /// Paths that cannot be opened are reported in
    /// [`UploadReport::files`]; the batch fails only when no text survives.
    pub async fn upload_paths(
        &self,
        session: &mut SessionState,
        paths: &[PathBuf],
    ) -> Result<UploadReport> {
        if paths.is_empty() {
            return Err(RagError::NoFiles);
        }
        self.index_extraction(session, extract_paths(paths)).await
    }

    async fn index_extraction(
        &self,
        session: &mut SessionState,
        extraction: Extraction,
    ) -> Result<UploadReport> {
        if extraction.failed_count() > 0 {
            tracing::warn!(
                failed = extraction.failed_count(),
                total = extraction.outcomes.len(),
                "some files could not be read"
            );
        }

        let mut report = self.index_records(session, extraction.records).await?;
        report.files = extraction.outcomes;
        Ok(report)
    }

    /// Chunk and index page records as one new batch.
    ///
    /// Used by [`Pipeline::upload`] after extraction, and directly when the
    /// page text is already at hand.
    pub async fn index_records(
        &self,
        session: &mut SessionState,
        records: Vec<TextRecord>,
    ) -> Result<UploadReport> {
        let record_count = records.len();
        let chunks = self.chunker.split_records(&records);
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        let chunk_count = chunks.len();

        let corpus = self
            .backend
            .extend(session.corpus(), chunks, self.embedder.as_ref())
            .await?;
        let batch = corpus.latest_batch().unwrap_or_default();
        let total_chunks = corpus.len();
        tracing::info!(records = record_count, chunks = chunk_count, batch, total_chunks, "indexed upload");
        session.set_corpus(corpus);

        let summary = self.snapshot(session).await;
        session.set_doc_summary(summary.clone());

        Ok(UploadReport {
            files: Vec::new(),
            records: record_count,
            chunks: chunk_count,
            batch,
            total_chunks,
            summary,
        })
    }

    /// Regenerate the executive snapshot for the session's current scope.
    pub async fn snapshot(&self, session: &SessionState) -> DocSummary {
        let (Some(corpus), Some(scope)) = (session.corpus(), session.scope()) else {
            return DocSummary::Failed(RagError::EmptyCorpus.to_string());
        };
        match self.summary.run(corpus, scope).await {
            Ok(text) => DocSummary::Ready(text),
            Err(e) => {
                tracing::warn!(error = %e, "executive snapshot failed");
                DocSummary::Failed(e.to_string())
            }
        }
    }
}
