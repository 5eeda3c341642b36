//! Core traits defining the interfaces to external collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Passage, VectorHit};

/// Supplies the raw passage collection at startup or on reload.
pub trait CorpusSource: Send + Sync {
    /// Load every raw passage. Cleaning happens in the corpus index.
    fn load(&self) -> Result<Vec<Passage>>;
}

/// External vector search provider.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` passages most similar to the query.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>>;
}

/// Embedding model trait.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of passage texts.
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Pairwise relevance model.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Score `(query, passage)` pairs; one logit per passage, input order.
    async fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;

    /// Maximum tokens per pair; longer pairs are truncated.
    fn max_length(&self) -> usize;
}
