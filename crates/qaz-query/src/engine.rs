//! End-to-end search: lexical retrieval, optional fusion, reranking.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use qaz_core::{FusionConfig, QazError, RerankedResult, Result, RetrievalResult, VectorSearch};
use qaz_rerank::Reranker;

use crate::fusion::{fuse_results, FusionWeights};
use crate::lexical::{LexicalRetriever, RetrieveParams};

/// Configuration for one search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Maximum number of results to return.
    pub top_k: usize,

    /// Lexical threshold; `None` uses the retriever default.
    pub threshold: Option<f64>,

    pub expand_query: Option<bool>,

    /// Fuse with vector search when a provider is configured.
    pub hybrid: bool,

    /// Candidates fetched from each side before reranking.
    pub candidates: usize,

    /// Deadline for the rerank stage.
    pub rerank_deadline: Duration,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: None,
            expand_query: None,
            hybrid: true,
            candidates: 20,
            rerank_deadline: Duration::from_secs(5),
        }
    }
}

/// Search results.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<RerankedResult>,
    /// False when the reranker missed its deadline and the pre-rerank order
    /// was returned instead.
    pub reranked: bool,
    /// Whether vector search contributed to the candidates.
    pub hybrid: bool,
    pub latency_ms: u64,
}

/// Retrieval-and-reranking pipeline.
pub struct SearchEngine {
    retriever: Arc<LexicalRetriever>,
    vector: Option<Arc<dyn VectorSearch>>,
    reranker: Arc<Reranker>,
    weights: FusionWeights,
}

impl SearchEngine {
    /// Create an engine without a vector search provider.
    pub fn new(retriever: Arc<LexicalRetriever>, reranker: Arc<Reranker>) -> Self {
        Self {
            retriever,
            vector: None,
            reranker,
            weights: FusionWeights::default(),
        }
    }

    /// Attach a vector search provider for hybrid requests.
    pub fn with_vector_search(mut self, vector: Arc<dyn VectorSearch>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_fusion(mut self, config: &FusionConfig) -> Self {
        self.weights = FusionWeights::from(config);
        self
    }

    pub fn retriever(&self) -> &LexicalRetriever {
        &self.retriever
    }

    /// Run the full pipeline for `query`.
    pub async fn search(&self, query: &str, request: SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();

        info!("Searching for: {:?}", query);

        let params = RetrieveParams {
            top_k: Some(request.candidates.max(request.top_k)),
            threshold: request.threshold,
            expand_query: request.expand_query,
        };
        let lexical = self.retriever.retrieve(query, params);

        let (candidates, hybrid) = match (&self.vector, request.hybrid) {
            (Some(vector), true) => (
                self.fuse_with_vector(vector.as_ref(), query, lexical, &request).await,
                true,
            ),
            _ => (
                lexical
                    .into_iter()
                    .map(|r| {
                        let score = r.lexical_score;
                        (r, score)
                    })
                    .collect(),
                false,
            ),
        };

        debug!("{} candidates before reranking", candidates.len());

        let (results, reranked) = if candidates.is_empty() {
            (Vec::new(), true)
        } else {
            let docs: Vec<RetrievalResult> = candidates.iter().map(|(r, _)| r.clone()).collect();
            match self
                .reranker
                .rerank_with_deadline(query, &docs, request.top_k, request.rerank_deadline)
                .await
            {
                Ok(results) => (results, true),
                Err(QazError::RerankTimeout { elapsed_ms }) => {
                    warn!(
                        "Reranker missed its {}ms deadline, returning pre-rerank order",
                        elapsed_ms
                    );
                    (fallback(candidates, request.top_k), false)
                }
                Err(e) => return Err(e),
            }
        };

        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            "Search completed in {}ms, returned {} results",
            latency_ms,
            results.len()
        );

        Ok(SearchResponse {
            query: query.to_string(),
            results,
            reranked,
            hybrid,
            latency_ms,
        })
    }

    /// Fuse lexical candidates with vector hits. A failing provider degrades
    /// the request to lexical-only.
    async fn fuse_with_vector(
        &self,
        vector: &dyn VectorSearch,
        query: &str,
        lexical: Vec<RetrievalResult>,
        request: &SearchRequest,
    ) -> Vec<(RetrievalResult, f64)> {
        let pool = request.candidates.max(request.top_k);
        let hits = match vector.search(query, pool).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Vector search failed, using lexical candidates only: {}", e);
                Vec::new()
            }
        };

        debug!(
            "Fusing {} lexical results with {} vector hits",
            lexical.len(),
            hits.len()
        );

        fuse_results(&lexical, &hits, self.weights, pool)
            .into_iter()
            .map(|f| (f.result, f.combined_score))
            .collect()
    }
}

/// Pre-rerank ordering, scored with the score it was ranked by.
fn fallback(candidates: Vec<(RetrievalResult, f64)>, top_k: usize) -> Vec<RerankedResult> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|(result, rerank_score)| RerankedResult {
            result,
            rerank_score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use qaz_core::{IndexConfig, Passage, PassageId, RerankConfig, RetrievalConfig, VectorHit};
    use qaz_rerank::MockCrossEncoder;
    use std::collections::HashMap;

    struct FixedVectors(Vec<VectorHit>);

    #[async_trait]
    impl VectorSearch for FixedVectors {
        async fn search(&self, _query: &str, k: usize) -> Result<Vec<VectorHit>> {
            Ok(self.0.iter().take(k).cloned().collect())
        }
    }

    struct BrokenVectors;

    #[async_trait]
    impl VectorSearch for BrokenVectors {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<VectorHit>> {
            Err(QazError::vector_search("index offline"))
        }
    }

    fn retriever() -> Arc<LexicalRetriever> {
        let passages = vec![
            Passage::new(0u64, "Astana is the capital city"),
            Passage::new(1u64, "Almaty is the largest city"),
            Passage::new(2u64, "The weather today is sunny"),
        ];
        Arc::new(
            LexicalRetriever::new(IndexConfig::default(), RetrievalConfig::default(), passages)
                .unwrap(),
        )
    }

    fn reranker(model: MockCrossEncoder) -> Arc<Reranker> {
        Arc::new(Reranker::cross_encoder(Arc::new(model), &RerankConfig::default()))
    }

    fn ids(response: &SearchResponse) -> Vec<PassageId> {
        response
            .results
            .iter()
            .map(|r| r.result.passage_id.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_lexical_then_rerank() {
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()));
        let response = engine
            .search("capital city", SearchRequest::default())
            .await
            .unwrap();

        assert!(response.reranked);
        assert!(!response.hybrid);
        assert_eq!(ids(&response), vec![PassageId::Num(0), PassageId::Num(1)]);
        assert_eq!(response.results[0].rerank_score, 2.0);
    }

    #[tokio::test]
    async fn test_empty_query() {
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()));
        let response = engine.search("   ", SearchRequest::default()).await.unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_adds_vector_only_candidates() {
        let vectors = FixedVectors(vec![VectorHit {
            passage_id: PassageId::Key("v1".to_string()),
            vector_similarity: 0.95,
            text: "Astana capital city skyline at night".to_string(),
            metadata: HashMap::new(),
        }]);
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()))
            .with_vector_search(Arc::new(vectors));

        let response = engine
            .search("capital city", SearchRequest::default())
            .await
            .unwrap();

        assert!(response.hybrid);
        assert_eq!(response.results.len(), 3);
        assert!(ids(&response).contains(&PassageId::Key("v1".to_string())));
    }

    #[tokio::test]
    async fn test_hybrid_keeps_top_k_above_candidates() {
        let hits = (0..4)
            .map(|i| VectorHit {
                passage_id: PassageId::Key(format!("v{}", i)),
                vector_similarity: 0.5,
                text: format!("city district {}", i),
                metadata: HashMap::new(),
            })
            .collect();
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()))
            .with_vector_search(Arc::new(FixedVectors(hits)));
        let request = SearchRequest {
            top_k: 5,
            candidates: 2,
            threshold: Some(0.0),
            ..SearchRequest::default()
        };

        let response = engine.search("capital city", request).await.unwrap();
        assert!(response.hybrid);
        assert_eq!(response.results.len(), 5);
    }

    #[tokio::test]
    async fn test_hybrid_disabled_per_request() {
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()))
            .with_vector_search(Arc::new(FixedVectors(Vec::new())));
        let request = SearchRequest {
            hybrid: false,
            ..SearchRequest::default()
        };
        let response = engine.search("capital city", request).await.unwrap();
        assert!(!response.hybrid);
    }

    #[tokio::test]
    async fn test_vector_failure_degrades_to_lexical() {
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::new()))
            .with_vector_search(Arc::new(BrokenVectors));
        let response = engine
            .search("capital city", SearchRequest::default())
            .await
            .unwrap();
        assert_eq!(ids(&response), vec![PassageId::Num(0), PassageId::Num(1)]);
    }

    #[tokio::test]
    async fn test_deadline_falls_back_to_lexical_order() {
        let slow = MockCrossEncoder::new().with_delay(Duration::from_millis(500));
        let engine = SearchEngine::new(retriever(), reranker(slow));
        let request = SearchRequest {
            top_k: 1,
            rerank_deadline: Duration::from_millis(20),
            ..SearchRequest::default()
        };

        let response = engine.search("capital city", request).await.unwrap();
        assert!(!response.reranked);
        assert_eq!(ids(&response), vec![PassageId::Num(0)]);
        assert_eq!(
            response.results[0].rerank_score,
            response.results[0].result.lexical_score
        );
    }

    #[tokio::test]
    async fn test_inference_error_propagates() {
        let engine = SearchEngine::new(retriever(), reranker(MockCrossEncoder::failing()));
        let err = engine
            .search("capital city", SearchRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "RERANK_INFERENCE_ERROR");
    }
}
