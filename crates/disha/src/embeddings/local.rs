//! Local ONNX-backed embedder via fastembed. The model is downloaded on
//! first use and cached; after that, embedding runs entirely offline.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;

use super::EmbeddingModel;

pub struct LocalEmbedder {
    // fastembed's embed() needs &mut; the pipeline shares the embedder
    // behind Arc, so calls serialize here.
    model: Mutex<fastembed::TextEmbedding>,
    dimension: usize,
}

impl LocalEmbedder {
    /// Initialize the default all-MiniLM-L6-v2 model (384 dimensions).
    pub fn new() -> Result<Self> {
        Self::with_model(fastembed::EmbeddingModel::AllMiniLML6V2, 384)
    }

    pub fn with_model(model: fastembed::EmbeddingModel, dimension: usize) -> Result<Self> {
        let model = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model).with_show_download_progress(true),
        )
        .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

        Ok(Self {
            model: Mutex::new(model),
            dimension,
        })
    }

    fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock();
        model
            .embed(texts, None)
            .map_err(|e| anyhow!("Local embedding failed: {}", e))
    }
}

impl EmbeddingModel for LocalEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_query(text)
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts.iter().map(|t| t.to_string()).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
