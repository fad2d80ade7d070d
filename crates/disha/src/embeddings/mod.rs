//! Embedding model seam.
//!
//! The pipeline only ever talks to [`EmbeddingModel`]; the concrete backend
//! is chosen at construction and injected, so tests substitute a
//! deterministic stub and production enables the `local-embeddings` feature.

#[cfg(feature = "local-embeddings")]
pub mod local;

use anyhow::Result;

/// Unified embedding model trait. Implementations must be deterministic for
/// a given model version, with a constant dimension across all indices built
/// with that model.
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document/corpus entry.
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for indexing.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}
