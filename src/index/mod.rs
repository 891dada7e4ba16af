//! Vector index over embedded chunks.
//!
//! An [`IndexedCorpus`] is an ordered list of chunks with their embeddings,
//! bound to one embedder identity. Queries are brute-force cosine similarity,
//! which is plenty for a handful of uploaded PDFs.
//!
//! Two [`IndexBackend`]s decide where a corpus lives:
//!
//! | Backend | Type | Lifetime |
//! |---------|------|----------|
//! | Ephemeral | [`EphemeralIndex`] | the session |
//! | Persistent | [`PersistentIndex`] | `<data_dir>/<provider>_index/corpus.sqlite` |
//!
//! Every upload is appended as a new *batch*. A [`Scope`] restricts a query
//! to the latest batch or lets it see the whole corpus.

pub mod memory;
pub mod persistent;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use crate::models::Chunk;
use crate::provider::{Backend, Provider};

pub use memory::EphemeralIndex;
pub use persistent::PersistentIndex;

/// A chunk, its embedding, and the upload batch it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub batch: u32,
}

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Which part of the corpus a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    All,
    Batch(u32),
}

impl Scope {
    pub fn contains(self, batch: u32) -> bool {
        match self {
            Scope::All => true,
            Scope::Batch(b) => b == batch,
        }
    }
}

/// Embedded chunks bound to one embedder identity and one backend.
#[derive(Debug, Clone)]
pub struct IndexedCorpus {
    embedder_id: String,
    backend: Backend,
    entries: Vec<IndexedChunk>,
    location: Option<PathBuf>,
}

impl IndexedCorpus {
    pub fn new(embedder_id: impl Into<String>, backend: Backend) -> Self {
        Self {
            embedder_id: embedder_id.into(),
            backend,
            entries: Vec::new(),
            location: None,
        }
    }

    pub(crate) fn with_entries(mut self, entries: Vec<IndexedChunk>) -> Self {
        self.entries = entries;
        self
    }

    pub(crate) fn with_location(mut self, location: PathBuf) -> Self {
        self.location = Some(location);
        self
    }

    pub fn embedder_id(&self) -> &str {
        &self.embedder_id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// On-disk file for persistent corpora.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn entries(&self) -> &[IndexedChunk] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest batch number, or `None` for an empty corpus.
    pub fn latest_batch(&self) -> Option<u32> {
        self.entries.iter().map(|e| e.batch).max()
    }

    pub fn next_batch(&self) -> u32 {
        self.latest_batch().map(|b| b + 1).unwrap_or(0)
    }

    /// Distinct source files in insertion order.
    pub fn sources(&self) -> Vec<String> {
        self.sources_in(Scope::All)
    }

    /// Distinct source files visible within `scope`, in insertion order.
    pub fn sources_in(&self, scope: Scope) -> Vec<String> {
        let mut seen = Vec::new();
        for e in self.entries.iter().filter(|e| scope.contains(e.batch)) {
            if !seen.contains(&e.chunk.source) {
                seen.push(e.chunk.source.clone());
            }
        }
        seen
    }

    /// Chunk counts per source file.
    pub fn chunks_per_source(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for e in &self.entries {
            *counts.entry(e.chunk.source.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Append chunks with their vectors as a new batch.
    pub(crate) fn append_batch(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<u32> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Index(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let batch = self.next_batch();
        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk {
                    chunk,
                    vector,
                    batch,
                }),
        );
        Ok(batch)
    }

    /// Fail unless `embedder` is the one this corpus was built with.
    pub fn ensure_embedder(&self, embedder: &dyn Embedder) -> Result<()> {
        if embedder.id() != self.embedder_id {
            return Err(RagError::ProviderMismatch {
                expected: self.embedder_id.clone(),
                found: embedder.id().to_string(),
            });
        }
        Ok(())
    }

    /// Nearest neighbours of a pre-computed query vector.
    ///
    /// Returns at most `k` results by descending similarity; equal scores
    /// keep insertion order.
    pub fn nearest(&self, query_vec: &[f32], k: usize, scope: Scope) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| scope.contains(e.batch))
            .map(|(i, e)| (i, cosine_similarity(query_vec, &e.vector)))
            .collect();
        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }

    /// Embed `question` and return its `k` nearest chunks within `scope`.
    pub async fn query(
        &self,
        embedder: &dyn Embedder,
        question: &str,
        k: usize,
        scope: Scope,
    ) -> Result<Vec<ScoredChunk>> {
        self.ensure_embedder(embedder)?;
        if self.is_empty() {
            return Err(RagError::EmptyCorpus);
        }
        let query_vec = embedder
            .embed_query(question)
            .await
            .map_err(|e| RagError::Chain(format!("query embedding failed: {:#}", e)))?;
        let hits = self.nearest(&query_vec, k, scope);
        tracing::debug!(
            k,
            hits = hits.len(),
            top = hits.first().map(|h| h.score).unwrap_or_default(),
            "retrieved chunks"
        );
        Ok(hits)
    }
}

/// Where corpora are built and loaded from.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    fn kind(&self) -> Backend;

    /// Existing non-empty corpus for `embedder`, or `None` when there is
    /// nothing to load. "Not found" is not an error.
    async fn load(&self, embedder: &dyn Embedder) -> Result<Option<IndexedCorpus>>;

    /// Embed `chunks` and append them as a new batch.
    ///
    /// `current` is the session's corpus; backends that own their storage
    /// may re-read it instead.
    async fn extend(
        &self,
        current: Option<&IndexedCorpus>,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<IndexedCorpus>;
}

/// Resolve a backend selection to its implementation.
pub fn create_backend(backend: Backend, data_dir: &Path) -> Box<dyn IndexBackend> {
    match backend {
        Backend::Ephemeral => Box::new(EphemeralIndex),
        Backend::Persistent => Box::new(PersistentIndex::new(data_dir)),
    }
}

/// Load the corpus a provider's pipeline would restore, without resolving
/// its embedder or chat model, so no API key is needed.
pub async fn load_corpus(
    backend: Backend,
    data_dir: &Path,
    provider: Provider,
) -> Result<Option<IndexedCorpus>> {
    match backend {
        Backend::Ephemeral => Ok(None),
        Backend::Persistent => PersistentIndex::new(data_dir).load_id(provider.key()).await,
    }
}

/// Embed chunk texts, mapping failures to an index error.
pub(crate) async fn embed_chunks(embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    embedder
        .embed(&texts)
        .await
        .map_err(|e| RagError::Index(format!("embedding failed: {:#}", e)))
}
