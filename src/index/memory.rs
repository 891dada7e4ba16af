//! Ephemeral in-memory backend.

use async_trait::async_trait;

use super::{embed_chunks, IndexBackend, IndexedCorpus};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::Chunk;
use crate::provider::Backend;

/// Keeps the corpus in working memory only.
pub struct EphemeralIndex;

#[async_trait]
impl IndexBackend for EphemeralIndex {
    fn kind(&self) -> Backend {
        Backend::Ephemeral
    }

    async fn load(&self, _embedder: &dyn Embedder) -> Result<Option<IndexedCorpus>> {
        Ok(None)
    }

    async fn extend(
        &self,
        current: Option<&IndexedCorpus>,
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
    ) -> Result<IndexedCorpus> {
        let mut corpus = match current {
            Some(existing) if existing.backend() == Backend::Ephemeral => {
                existing.ensure_embedder(embedder)?;
                existing.clone()
            }
            _ => IndexedCorpus::new(embedder.id(), Backend::Ephemeral),
        };

        let vectors = embed_chunks(embedder, &chunks).await?;
        let batch = corpus.append_batch(chunks, vectors)?;
        tracing::info!(batch, total = corpus.len(), "extended in-memory corpus");
        Ok(corpus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;

    struct NamedEmbedder(&'static str);

    #[async_trait]
    impl Embedder for NamedEmbedder {
        fn id(&self) -> &str {
            self.0
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn chunks(text: &str) -> Vec<Chunk> {
        vec![Chunk {
            text: text.to_string(),
            source: "doc.pdf".to_string(),
            page: 1,
        }]
    }

    #[tokio::test]
    async fn extend_appends_batches() {
        let embedder = NamedEmbedder("groq");
        let first = EphemeralIndex.extend(None, chunks("one"), &embedder).await.unwrap();
        let second = EphemeralIndex
            .extend(Some(&first), chunks("two"), &embedder)
            .await
            .unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.latest_batch(), Some(1));
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn extend_with_other_embedder_fails_fast() {
        let corpus = EphemeralIndex
            .extend(None, chunks("one"), &NamedEmbedder("groq"))
            .await
            .unwrap();
        let err = EphemeralIndex
            .extend(Some(&corpus), chunks("two"), &NamedEmbedder("gemini"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::ProviderMismatch { .. }));
    }
}
