//! Second-stage reranking of retrieved candidates.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use qaz_core::{
    CrossEncoder, Embedder, QazError, RerankConfig, RerankStrategy, RerankedResult, Result,
    RetrievalResult,
};

use crate::onnx::{OnnxCrossEncoder, OnnxEmbedder};

/// Scores `(query, passage)` pairs with a cross-encoder, batch by batch.
pub struct CrossEncoderReranker {
    model: Arc<dyn CrossEncoder>,
    batch_size: usize,
    permits: Semaphore,
}

impl CrossEncoderReranker {
    pub fn new(model: Arc<dyn CrossEncoder>, config: &RerankConfig) -> Self {
        Self {
            model,
            batch_size: config.batch_size.max(1),
            permits: Semaphore::new(config.max_concurrent.max(1)),
        }
    }

    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f64>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| QazError::rerank(format!("Reranker closed: {}", e)))?;

        let mut scores = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let logits = self.model.score_pairs(query, batch).await?;
            if logits.len() != batch.len() {
                return Err(QazError::rerank(format!(
                    "Model returned {} scores for {} pairs",
                    logits.len(),
                    batch.len()
                )));
            }
            scores.extend(logits.into_iter().map(f64::from));
        }
        Ok(scores)
    }
}

/// Scores passages by cosine similarity of independent embeddings.
pub struct EmbeddingReranker {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    permits: Semaphore,
}

impl EmbeddingReranker {
    pub fn new(embedder: Arc<dyn Embedder>, config: &RerankConfig) -> Self {
        Self {
            embedder,
            batch_size: config.batch_size.max(1),
            permits: Semaphore::new(config.max_concurrent.max(1)),
        }
    }

    async fn score(&self, query: &str, texts: &[&str]) -> Result<Vec<f64>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| QazError::rerank(format!("Reranker closed: {}", e)))?;

        let query_embedding = self.embedder.embed_query(query).await.map_err(inference)?;

        let mut scores = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self.embedder.embed_passages(batch).await.map_err(inference)?;
            if embeddings.len() != batch.len() {
                return Err(QazError::rerank(format!(
                    "Embedder returned {} vectors for {} passages",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for embedding in &embeddings {
                scores.push(cosine_similarity(&query_embedding, embedding)?);
            }
        }
        Ok(scores)
    }
}

fn inference(err: QazError) -> QazError {
    match err {
        QazError::RerankInference { .. } => err,
        other => QazError::rerank(other.to_string()),
    }
}

/// Cosine similarity; zero when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(QazError::rerank(format!(
            "Embedding dimensions differ: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Reranking strategy with its model provider.
pub enum Reranker {
    CrossEncoder(CrossEncoderReranker),
    EmbeddingSimilarity(EmbeddingReranker),
}

impl Reranker {
    /// Cross-encoder reranker over any pairwise model.
    pub fn cross_encoder(model: Arc<dyn CrossEncoder>, config: &RerankConfig) -> Self {
        Self::CrossEncoder(CrossEncoderReranker::new(model, config))
    }

    /// Embedding-similarity reranker over any embedder.
    pub fn embedding_similarity(embedder: Arc<dyn Embedder>, config: &RerankConfig) -> Self {
        Self::EmbeddingSimilarity(EmbeddingReranker::new(embedder, config))
    }

    /// Load the configured strategy's ONNX model from `config.model_path`.
    ///
    /// Fails if the model cannot be loaded; there is no silent fallback.
    pub fn from_config(config: &RerankConfig) -> Result<Self> {
        let reranker = match config.strategy {
            RerankStrategy::CrossEncoder => Self::cross_encoder(
                Arc::new(OnnxCrossEncoder::from_dir(&config.model_path, config)?),
                config,
            ),
            RerankStrategy::EmbeddingSimilarity => Self::embedding_similarity(
                Arc::new(OnnxEmbedder::from_dir(&config.model_path, config).map_err(inference)?),
                config,
            ),
        };
        info!("Reranker ready: {:?}", config.strategy);
        Ok(reranker)
    }

    pub fn strategy(&self) -> RerankStrategy {
        match self {
            Self::CrossEncoder(_) => RerankStrategy::CrossEncoder,
            Self::EmbeddingSimilarity(_) => RerankStrategy::EmbeddingSimilarity,
        }
    }

    /// Rescore `docs` against `query` and return the best `top_k`.
    ///
    /// Results are new records sorted by descending `rerank_score`; equal
    /// scores keep their input order.
    pub async fn rerank(
        &self,
        query: &str,
        docs: &[RetrievalResult],
        top_k: usize,
    ) -> Result<Vec<RerankedResult>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();

        let scores = match self {
            Self::CrossEncoder(r) => r.score(query, &texts).await?,
            Self::EmbeddingSimilarity(r) => r.score(query, &texts).await?,
        };

        if scores.len() != docs.len() {
            return Err(QazError::rerank(format!(
                "Got {} scores for {} documents",
                scores.len(),
                docs.len()
            )));
        }
        if let Some(bad) = scores.iter().position(|s| !s.is_finite()) {
            return Err(QazError::rerank(format!(
                "Non-finite rerank score {} for passage {}",
                scores[bad], docs[bad].passage_id
            )));
        }

        let mut reranked: Vec<RerankedResult> = docs
            .iter()
            .zip(scores)
            .map(|(doc, rerank_score)| RerankedResult {
                result: doc.clone(),
                rerank_score,
            })
            .collect();

        reranked.sort_by(|a, b| {
            b.rerank_score
                .partial_cmp(&a.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        reranked.truncate(top_k);

        debug!(
            "Reranked {} candidates with {:?} in {:?}",
            docs.len(),
            self.strategy(),
            start.elapsed()
        );

        Ok(reranked)
    }

    /// [`rerank`](Self::rerank) bounded by `deadline`.
    ///
    /// Fails with [`QazError::RerankTimeout`] when the deadline passes first.
    pub async fn rerank_with_deadline(
        &self,
        query: &str,
        docs: &[RetrievalResult],
        top_k: usize,
        deadline: Duration,
    ) -> Result<Vec<RerankedResult>> {
        match tokio::time::timeout(deadline, self.rerank(query, docs, top_k)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Reranking {} candidates exceeded {:?}", docs.len(), deadline);
                Err(QazError::RerankTimeout {
                    elapsed_ms: deadline.as_millis() as u64,
                })
            }
        }
    }
}
