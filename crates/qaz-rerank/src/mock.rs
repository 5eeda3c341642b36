//! Deterministic model providers for tests and model-free runs.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use qaz_core::{CrossEncoder, Embedder, QazError, Result};
use qaz_text::{tokenize, TokenizeOptions};

use crate::onnx::l2_normalize;

/// A mock embedder that hashes stemmed tokens into buckets.
///
/// Texts sharing tokens get positive cosine similarity; texts with no tokens
/// embed to the zero vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with default settings.
    pub fn new() -> Self {
        Self { dimension: 256 }
    }

    /// Create a mock embedder with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in tokenize(text, TokenizeOptions::indexing()) {
            // FNV-1a keeps bucket assignment stable across runs.
            let hash = token
                .bytes()
                .fold(0xcbf29ce484222325u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(0x100000001b3)
                });
            embedding[(hash % self.dimension as u64) as usize] += 1.0;
        }
        l2_normalize(embedding)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_one(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// A mock cross-encoder scoring pairs by shared distinct tokens.
#[derive(Debug, Clone, Default)]
pub struct MockCrossEncoder {
    delay: Option<Duration>,
    fail: bool,
}

impl MockCrossEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before every batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with an inference error.
    pub fn failing() -> Self {
        Self {
            delay: None,
            fail: true,
        }
    }
}

#[async_trait]
impl CrossEncoder for MockCrossEncoder {
    async fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(QazError::rerank("mock cross-encoder failure"));
        }

        let options = TokenizeOptions::indexing();
        let query_tokens: HashSet<String> = tokenize(query, options).into_iter().collect();

        Ok(passages
            .iter()
            .map(|passage| {
                let passage_tokens: HashSet<String> =
                    tokenize(passage, options).into_iter().collect();
                query_tokens.intersection(&passage_tokens).count() as f32
            })
            .collect())
    }

    fn max_length(&self) -> usize {
        512
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_normalized() {
        let embedder = MockEmbedder::new();
        assert_eq!(embedder.dimension(), 256);

        let embeddings = embedder
            .embed_passages(&["Астана қаласы", "Алматы қаласы"])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 256);

        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::with_dimension(64);
        let e1 = embedder.embed_query("тарихи мәлімет").await.unwrap();
        let e2 = embedder.embed_query("тарихи мәлімет").await.unwrap();
        assert_eq!(e1, e2);

        let blank = embedder.embed_query("   ").await.unwrap();
        assert!(blank.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_mock_cross_encoder_overlap() {
        let model = MockCrossEncoder::new();
        let scores = model
            .score_pairs(
                "capital city",
                &["Astana is the capital city", "Almaty is a city", "sunny weather"],
            )
            .await
            .unwrap();
        assert_eq!(scores, vec![2.0, 1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_mock_cross_encoder_failing() {
        let err = MockCrossEncoder::failing()
            .score_pairs("q", &["p"])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RERANK_INFERENCE_ERROR");
    }
}
