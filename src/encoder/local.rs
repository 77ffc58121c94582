//! Local inference through fastembed.
//!
//! The model is downloaded from Hugging Face on first use and cached; after
//! that, encoding runs offline on a blocking task.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use jobscope_core::embedding::TextEncoder;
use parking_lot::Mutex;

use crate::config::EmbeddingConfig;

const DEFAULT_MODEL: &str = "multilingual-e5-small";

fn model_for(name: &str) -> Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        "multilingual-e5-base" => Ok((fastembed::EmbeddingModel::MultilingualE5Base, 768)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, \
             multilingual-e5-small, multilingual-e5-base",
            other
        ),
    }
}

pub struct LocalEncoder {
    model_name: String,
    dims: usize,
    model: Arc<Mutex<fastembed::TextEmbedding>>,
}

impl LocalEncoder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let (model, dims) = model_for(&model_name)?;
        if dims != config.dims {
            bail!(
                "embedding.dims is {} but model '{}' produces {} dimensions",
                config.dims,
                model_name,
                dims
            );
        }

        let embedding = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model_name,
            dims,
            model: Arc::new(Mutex::new(embedding)),
        })
    }
}

#[async_trait]
impl TextEncoder for LocalEncoder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model.clone();
        let input = vec![text.to_string()];
        tokio::task::spawn_blocking(move || {
            let mut embeddings = model
                .lock()
                .embed(input, None)
                .map_err(|e| anyhow::anyhow!("Local embedding failed: {}", e))?;
            embeddings
                .pop()
                .ok_or_else(|| anyhow::anyhow!("Local embedding returned no vector"))
        })
        .await?
    }
}
