//! In-process sentence-transformer embeddings via fastembed.
//!
//! Models are downloaded from Hugging Face on first use and cached on
//! disk; afterwards embedding runs fully offline. The loaded model is kept
//! for the lifetime of the provider and inference runs on a blocking
//! thread.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;

pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, native_dims) = resolve_model(&config.model)?;
        if config.dims != native_dims {
            bail!(
                "embedding.dims is {} but local model '{}' produces {}-dimensional vectors",
                config.dims,
                config.model,
                native_dims
            );
        }
        Ok(Self {
            model_name: config.model.clone(),
            model,
            dims: native_dims,
            batch_size: config.batch_size,
            loaded: Arc::new(Mutex::new(None)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn provider_name(&self) -> &str {
        "local"
    }
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = texts.to_vec();
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| anyhow::anyhow!("local embedding model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!(model = ?model, "loading local embedding model");
                let instance = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;
                *guard = Some(instance);
            }
            let instance = guard
                .as_mut()
                .ok_or_else(|| anyhow::anyhow!("local embedding model not loaded"))?;

            instance
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

/// Map a configured model name to its fastembed model and native width.
fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384))
        }
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((fastembed::EmbeddingModel::NomicEmbedTextV15, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, nomic-embed-text-v1.5",
            other
        ),
    }
}
