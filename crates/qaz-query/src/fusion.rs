//! Linear fusion of lexical scores and vector similarities.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use qaz_core::{FusedResult, FusionConfig, PassageId, RetrievalResult, VectorHit};

/// Weights of the two signals. They need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub text: f64,
    pub vector: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            text: 0.3,
            vector: 0.7,
        }
    }
}

impl From<&FusionConfig> for FusionWeights {
    fn from(config: &FusionConfig) -> Self {
        Self {
            text: config.weight_text,
            vector: config.weight_vector,
        }
    }
}

/// Combined score = vector * (similarity + 1) + text * text_score.
///
/// The shift maps cosine similarity from [-1, 1] to [0, 2] so the vector term
/// is never negative.
pub fn fuse(text_score: f64, vector_similarity: f64, weights: FusionWeights) -> f64 {
    weights.vector * (vector_similarity + 1.0) + weights.text * text_score
}

/// Merge lexical results and vector hits by passage id and rank by fused score.
///
/// Passages found only by vector search enter with a lexical score of 0.
/// Passages without a vector similarity get no vector term. Ties keep
/// lexical order first, then vector order.
pub fn fuse_results(
    lexical: &[RetrievalResult],
    hits: &[VectorHit],
    weights: FusionWeights,
    top_k: usize,
) -> Vec<FusedResult> {
    let mut merged: Vec<RetrievalResult> = lexical.to_vec();
    let mut by_id: HashMap<PassageId, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, r)| (r.passage_id.clone(), i))
        .collect();

    for hit in hits {
        match by_id.get(&hit.passage_id) {
            Some(&i) => merged[i] = merged[i].with_vector_score(hit.vector_similarity),
            None => {
                by_id.insert(hit.passage_id.clone(), merged.len());
                merged.push(RetrievalResult {
                    passage_id: hit.passage_id.clone(),
                    text: hit.text.clone(),
                    lexical_score: 0.0,
                    vector_score: Some(hit.vector_similarity),
                    tokens_sample: Vec::new(),
                });
            }
        }
    }

    let mut fused: Vec<FusedResult> = merged
        .into_iter()
        .map(|result| {
            let combined_score = match result.vector_score {
                Some(similarity) => fuse(result.lexical_score, similarity, weights),
                None => weights.text * result.lexical_score,
            };
            FusedResult {
                result,
                combined_score,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(top_k);

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lexical(id: u64, score: f64) -> RetrievalResult {
        RetrievalResult {
            passage_id: PassageId::Num(id),
            text: format!("passage {}", id),
            lexical_score: score,
            vector_score: None,
            tokens_sample: vec!["passage".to_string()],
        }
    }

    fn hit(id: u64, similarity: f64) -> VectorHit {
        VectorHit {
            passage_id: PassageId::Num(id),
            vector_similarity: similarity,
            text: format!("passage {}", id),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_fuse_formula() {
        let weights = FusionWeights::default();
        assert_eq!(fuse(0.5, 0.0, weights), 0.85);
        assert_eq!(fuse(0.0, -1.0, weights), 0.0);
        assert!((fuse(2.0, 1.0, weights) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_fuse_custom_weights() {
        let weights = FusionWeights {
            text: 1.0,
            vector: 1.0,
        };
        assert_eq!(fuse(3.0, 0.5, weights), 4.5);
    }

    #[test]
    fn test_weights_from_config() {
        let weights = FusionWeights::from(&FusionConfig::default());
        assert_eq!(weights, FusionWeights::default());
    }

    #[test]
    fn test_merge_by_id() {
        let fused = fuse_results(
            &[lexical(1, 2.0), lexical(2, 1.0)],
            &[hit(2, 0.9), hit(3, 0.5)],
            FusionWeights::default(),
            10,
        );

        assert_eq!(fused.len(), 3);
        // 2: 0.7 * 1.9 + 0.3 * 1.0 = 1.63
        // 3: 0.7 * 1.5 = 1.05
        // 1: 0.3 * 2.0 = 0.6
        let ids: Vec<_> = fused.iter().map(|f| f.result.passage_id.clone()).collect();
        assert_eq!(ids, vec![PassageId::Num(2), PassageId::Num(3), PassageId::Num(1)]);
        assert!((fused[0].combined_score - 1.63).abs() < 1e-9);
        assert_eq!(fused[0].result.vector_score, Some(0.9));
        assert_eq!(fused[0].result.lexical_score, 1.0);
        assert_eq!(fused[1].result.lexical_score, 0.0);
        assert!(fused[1].result.tokens_sample.is_empty());
        assert_eq!(fused[2].result.vector_score, None);
    }

    #[test]
    fn test_truncates_and_keeps_ties_stable() {
        let fused = fuse_results(
            &[lexical(5, 1.0), lexical(6, 1.0), lexical(7, 1.0)],
            &[],
            FusionWeights::default(),
            2,
        );
        let ids: Vec<_> = fused.iter().map(|f| f.result.passage_id.clone()).collect();
        assert_eq!(ids, vec![PassageId::Num(5), PassageId::Num(6)]);
    }

    #[test]
    fn test_inputs_untouched() {
        let input = vec![lexical(1, 2.0)];
        let _ = fuse_results(&input, &[hit(1, 0.3)], FusionWeights::default(), 5);
        assert_eq!(input[0].vector_score, None);
    }
}
