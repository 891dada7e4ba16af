//! Disk-persisted backend.
//!
//! Each embedder identity gets its own directory, so corpora embedded by
//! different providers never mix:
//!
//! ```text
//! <data_dir>/
//! ├── groq_index/corpus.sqlite
//! ├── gemini_index/corpus.sqlite
//! └── .staging/            (in-progress builds)
//! ```
//!
//! A build writes a complete new file under `.staging/` and then renames it
//! over `corpus.sqlite`. The rename is atomic on one filesystem, so a
//! concurrent reader sees either the old corpus or the new one, never a
//! half-written file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use super::{embed_chunks, IndexBackend, IndexedChunk, IndexedCorpus};
use crate::db;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::migrate;
use crate::models::Chunk;
use crate::provider::Backend;

const CORPUS_FILE: &str = "corpus.sqlite";
const STAGING_DIR: &str = ".staging";

/// Corpora stored as SQLite files under a data directory.
pub struct PersistentIndex {
    root: PathBuf,
}

impl PersistentIndex {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Directory holding the corpus for one embedder identity.
    pub fn dir_for(&self, embedder_id: &str) -> PathBuf {
        self.root
            .join(format!("{}_index", embedder_id.to_ascii_lowercase()))
    }

    pub fn file_for(&self, embedder_id: &str) -> PathBuf {
        self.dir_for(embedder_id).join(CORPUS_FILE)
    }

    /// Load the corpus stored for `embedder_id` without an embedder at hand.
    ///
    /// Missing or empty directories and empty corpora are `None`.
    pub async fn load_id(&self, embedder_id: &str) -> Result<Option<IndexedCorpus>> {
        let dir = self.dir_for(embedder_id);
        if !dir_has_entries(&dir) {
            return Ok(None);
        }
        let file = dir.join(CORPUS_FILE);
        if !file.exists() {
            return Err(RagError::Index(format!(
                "{} is not empty but holds no {}",
                dir.display(),
                CORPUS_FILE
            )));
        }

        let corpus = read_corpus(&file, embedder_id).await?;
        if corpus.is_empty() {
            return Ok(None);
        }
        tracing::info!(path = %file.display(), chunks = corpus.len(), "loaded persistent corpus");
        Ok(Some(corpus))
    }
}

fn index_err(e: impl std::fmt::Display) -> RagError {
    RagError::Index(e.to_string())
}

/// True when `dir` exists and has at least one entry.
fn dir_has_entries(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

async fn read_corpus(path: &Path, embedder_id: &str) -> Result<IndexedCorpus> {
    let pool = db::connect(path, false).await.map_err(index_err)?;

    let stored_id: Option<String> =
        sqlx::query_scalar("SELECT value FROM corpus_meta WHERE key = 'embedder_id'")
            .fetch_optional(&pool)
            .await
            .map_err(index_err)?;
    if let Some(stored) = stored_id {
        if stored != embedder_id {
            pool.close().await;
            return Err(RagError::ProviderMismatch {
                expected: stored,
                found: embedder_id.to_string(),
            });
        }
    }

    let rows = sqlx::query("SELECT batch, source, page, text, embedding FROM chunks ORDER BY seq")
        .fetch_all(&pool)
        .await
        .map_err(index_err)?;

    let entries = rows
        .iter()
        .map(|row| IndexedChunk {
            chunk: Chunk {
                text: row.get("text"),
                source: row.get("source"),
                page: row.get::<i64, _>("page") as u32,
            },
            vector: blob_to_vec(&row.get::<Vec<u8>, _>("embedding")),
            batch: row.get::<i64, _>("batch") as u32,
        })
        .collect();

    pool.close().await;

    Ok(IndexedCorpus::new(embedder_id, Backend::Persistent)
        .with_entries(entries)
        .with_location(path.to_path_buf()))
}

async fn write_corpus(path: &Path, corpus: &IndexedCorpus, model: &str) -> anyhow::Result<()> {
    let pool = db::connect(path, true).await?;
    migrate::run_migrations(&pool).await?;

    let dims = corpus
        .entries()
        .first()
        .map(|e| e.vector.len())
        .unwrap_or(0);
    let meta = [
        ("embedder_id", corpus.embedder_id().to_string()),
        ("model", model.to_string()),
        ("dims", dims.to_string()),
        ("updated_at", chrono::Utc::now().to_rfc3339()),
    ];

    let mut tx = pool.begin().await?;
    for (key, value) in meta {
        sqlx::query("INSERT OR REPLACE INTO corpus_meta (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
    }
    for (seq, entry) in corpus.entries().iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (seq, batch, source, page, text, hash, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(seq as i64)
        .bind(entry.batch as i64)
        .bind(&entry.chunk.source)
        .bind(entry.chunk.page as i64)
        .bind(&entry.chunk.text)
        .bind(text_hash(&entry.chunk.text))
        .bind(vec_to_blob(&entry.vector))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    pool.close().await;
    Ok(())
}

#[async_trait]
impl IndexBackend for PersistentIndex {
    fn kind(&self) -> Backend {
        Backend::Persistent
    }

    async fn load(&self, embedder: &dyn Embedder) -> Result<Option<IndexedCorpus>> {
        self.load_id(embedder.id()).await
    }

    /// Re-reads the on-disk corpus rather than trusting `current`, so
    /// batches published by another session are kept.
    async fn extend(
        &self,
        _current: Option<&IndexedCorpus>,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<IndexedCorpus> {
        let mut corpus = self
            .load(embedder)
            .await?
            .unwrap_or_else(|| IndexedCorpus::new(embedder.id(), Backend::Persistent));

        let vectors = embed_chunks(embedder, &chunks).await?;
        let batch = corpus.append_batch(chunks, vectors)?;

        let staging = self.root.join(STAGING_DIR);
        std::fs::create_dir_all(&staging).map_err(index_err)?;
        let tmp = staging.join(format!("{}-{}.sqlite", embedder.id(), Uuid::new_v4()));

        if let Err(e) = write_corpus(&tmp, &corpus, embedder.model_name()).await {
            let _ = std::fs::remove_file(&tmp);
            return Err(RagError::Index(format!("failed to write corpus: {:#}", e)));
        }

        let dir = self.dir_for(embedder.id());
        std::fs::create_dir_all(&dir).map_err(index_err)?;
        let target = dir.join(CORPUS_FILE);
        std::fs::rename(&tmp, &target).map_err(index_err)?;

        tracing::info!(
            path = %target.display(),
            batch,
            total = corpus.len(),
            "published persistent corpus"
        );
        Ok(corpus.with_location(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LetterEmbedder(&'static str);

    #[async_trait]
    impl Embedder for LetterEmbedder {
        fn id(&self) -> &str {
            self.0
        }
        fn model_name(&self) -> &str {
            "letters"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_ascii_lowercase().bytes() {
                        if c.is_ascii_lowercase() {
                            v[(c - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn chunk(text: &str, page: u32) -> Chunk {
        Chunk {
            text: text.to_string(),
            source: "doc.pdf".to_string(),
            page,
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[tokio::test]
    async fn missing_directory_is_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PersistentIndex::new(tmp.path());
        assert!(index.load(&LetterEmbedder("groq")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn extend_publishes_and_reloads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PersistentIndex::new(tmp.path());
        let embedder = LetterEmbedder("groq");

        let first = index
            .extend(None, vec![chunk("apples and pears", 1)], &embedder)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.location(), Some(index.file_for("groq").as_path()));

        let second = index
            .extend(Some(&first), vec![chunk("zebra zoo", 2)], &embedder)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.latest_batch(), Some(1));

        let loaded = index.load(&embedder).await.unwrap().unwrap();
        assert_eq!(loaded.entries(), second.entries());
        assert!(
            std::fs::read_dir(tmp.path().join(STAGING_DIR))
                .unwrap()
                .next()
                .is_none(),
            "staging must be empty after publish"
        );
    }

    #[tokio::test]
    async fn providers_are_namespaced() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PersistentIndex::new(tmp.path());
        index
            .extend(None, vec![chunk("alpha", 1)], &LetterEmbedder("groq"))
            .await
            .unwrap();

        assert!(index.load(&LetterEmbedder("gemini")).await.unwrap().is_none());
        assert!(index.dir_for("groq").exists());
        assert!(!index.dir_for("gemini").exists());
    }

    #[tokio::test]
    async fn foreign_corpus_file_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PersistentIndex::new(tmp.path());
        index
            .extend(None, vec![chunk("alpha", 1)], &LetterEmbedder("groq"))
            .await
            .unwrap();
        // Simulate a corpus copied under another provider's directory.
        std::fs::create_dir_all(index.dir_for("gemini")).unwrap();
        std::fs::copy(index.file_for("groq"), index.file_for("gemini")).unwrap();

        let err = index.load(&LetterEmbedder("gemini")).await.unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
    }

    #[tokio::test]
    async fn load_by_id_needs_no_embedder() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = PersistentIndex::new(tmp.path());
        assert!(index.load_id("groq").await.unwrap().is_none());
        index
            .extend(None, vec![chunk("alpha", 1)], &LetterEmbedder("groq"))
            .await
            .unwrap();

        let corpus = index.load_id("groq").await.unwrap().unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.embedder_id(), "groq");
    }
}
