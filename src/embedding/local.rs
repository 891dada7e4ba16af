//! Local `all-MiniLM-L6-v2` embeddings via fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that no network calls are made. Inference runs on the blocking pool.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use super::Embedder;
use crate::config::EmbeddingConfig;

pub struct LocalEmbedder {
    id: String,
    batch_size: usize,
    // Loaded lazily so selecting the provider costs nothing until indexing.
    model: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(id: &str, config: &EmbeddingConfig) -> Self {
        Self {
            id: id.to_string(),
            batch_size: config.batch_size.max(1),
            model: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        "all-minilm-l6-v2"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!("loading local embedding model all-MiniLM-L6-v2");
                let loaded = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                        .with_show_download_progress(true),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(loaded);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("local embedding model unavailable"))?;

            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}
