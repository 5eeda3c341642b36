//! Configuration types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration for the retrieval engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QazConfig {
    /// Corpus index configuration.
    #[serde(default)]
    pub index: IndexConfig,

    /// Lexical retrieval configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Hybrid fusion configuration.
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Reranker configuration.
    #[serde(default)]
    pub rerank: RerankConfig,
}

/// BM25 family variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bm25Variant {
    /// Classic saturating TF-IDF form.
    Okapi,
    /// Adds a floor term so any term overlap scores above zero.
    #[default]
    Plus,
}

/// Which passages IDF and average length are computed over when the
/// candidate set is a strict subset of the corpus.
///
/// Only applies to [`Bm25Variant::Plus`]; Okapi always scores with
/// snapshot-wide statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdfScope {
    /// Statistics over the shortlisted candidates only.
    #[default]
    Candidates,
    /// Statistics over the whole snapshot.
    Corpus,
}

/// BM25 parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Config {
    #[serde(default)]
    pub variant: Bm25Variant,

    /// Term frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,

    /// Length normalization strength.
    #[serde(default = "default_b")]
    pub b: f64,

    /// Floor for negative Okapi IDF, as a fraction of the average IDF.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Per-term floor added by the Plus variant.
    #[serde(default = "default_delta")]
    pub delta: f64,
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            variant: Bm25Variant::Plus,
            k1: 1.5,
            b: 0.75,
            epsilon: 0.25,
            delta: 1.0,
        }
    }
}

/// Corpus index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Passages shorter than this (in chars, after cleaning) are dropped.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,

    /// Passages longer than this are truncated.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    /// Minimum count of Kazakh-specific letters for long passages.
    #[serde(default = "default_min_special_chars")]
    pub min_special_chars: usize,

    /// Length above which the special letter check applies.
    #[serde(default = "default_special_check_above")]
    pub special_check_above: usize,

    /// Stem tokens when indexing and querying.
    #[serde(default = "default_true")]
    pub use_stemming: bool,

    /// Drop stop-words when indexing and querying.
    #[serde(default)]
    pub remove_stopwords: bool,

    #[serde(default)]
    pub bm25: Bm25Config,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            min_chars: 20,
            max_chars: 1000,
            min_special_chars: 3,
            special_check_above: 50,
            use_stemming: true,
            remove_stopwords: false,
            bm25: Bm25Config::default(),
        }
    }
}

/// Lexical retrieval configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of results.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Default relevance threshold.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,

    /// Expand queries with synonyms by default.
    #[serde(default = "default_true")]
    pub expand_query: bool,

    /// Maximum number of cached result lists.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Statistics scope for candidate scoring.
    #[serde(default)]
    pub idf_scope: IdfScope,

    /// Number of tokens kept in each result's sample.
    #[serde(default = "default_sample_tokens")]
    pub sample_tokens: usize,

    /// Synonym table; empty means the built-in Kazakh table.
    #[serde(default)]
    pub synonyms: BTreeMap<String, Vec<String>>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            default_threshold: 0.1,
            expand_query: true,
            cache_capacity: 256,
            idf_scope: IdfScope::Candidates,
            sample_tokens: 10,
            synonyms: BTreeMap::new(),
        }
    }
}

/// Hybrid fusion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionConfig {
    /// Weight of the lexical score.
    #[serde(default = "default_weight_text")]
    pub weight_text: f64,

    /// Weight of the shifted vector similarity.
    #[serde(default = "default_weight_vector")]
    pub weight_vector: f64,

    /// Number of candidates fetched from each side before fusion.
    #[serde(default = "default_candidates")]
    pub candidates: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            weight_text: 0.3,
            weight_vector: 0.7,
            candidates: 20,
        }
    }
}

/// Reranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankStrategy {
    /// Pairwise sequence-classification model.
    #[default]
    CrossEncoder,
    /// Cosine similarity between independent embeddings.
    EmbeddingSimilarity,
}

/// Reranker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    #[serde(default)]
    pub strategy: RerankStrategy,

    /// Path to the ONNX model directory (model.onnx + tokenizer.json).
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Pairs or passages per inference batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum tokens per (query, passage) pair.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Concurrent inference calls allowed.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Deadline after which the caller falls back to lexical ranking.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            strategy: RerankStrategy::CrossEncoder,
            model_path: default_model_path(),
            batch_size: 8,
            max_length: 512,
            max_concurrent: 2,
            deadline_ms: 5000,
            num_threads: 4,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_k1() -> f64 {
    1.5
}

fn default_b() -> f64 {
    0.75
}

fn default_epsilon() -> f64 {
    0.25
}

fn default_delta() -> f64 {
    1.0
}

fn default_min_chars() -> usize {
    20
}

fn default_max_chars() -> usize {
    1000
}

fn default_min_special_chars() -> usize {
    3
}

fn default_special_check_above() -> usize {
    50
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f64 {
    0.1
}

fn default_cache_capacity() -> u64 {
    256
}

fn default_sample_tokens() -> usize {
    10
}

fn default_weight_text() -> f64 {
    0.3
}

fn default_weight_vector() -> f64 {
    0.7
}

fn default_candidates() -> usize {
    20
}

fn default_batch_size() -> usize {
    8
}

fn default_max_length() -> usize {
    512
}

fn default_max_concurrent() -> usize {
    2
}

fn default_deadline_ms() -> u64 {
    5000
}

fn default_num_threads() -> usize {
    4
}

fn default_model_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qazsearch")
        .join("models")
        .join("roberta-reranker-kaz")
}

impl QazConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        toml::from_str(content).map_err(|e| crate::error::QazError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("qazsearch").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("qaz.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        // Return defaults
        Ok(Self::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = QazConfig::default();
        assert_eq!(config.retrieval.default_top_k, 5);
        assert_eq!(config.retrieval.cache_capacity, 256);
        assert_eq!(config.index.bm25.variant, Bm25Variant::Plus);
        assert_eq!(config.rerank.batch_size, 8);
        assert_eq!(config.rerank.max_length, 512);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = QazConfig::parse(
            r#"
            [index.bm25]
            variant = "okapi"

            [retrieval]
            default_top_k = 3
            idf_scope = "corpus"

            [retrieval.synonyms]
            "ауыл" = ["село"]

            [rerank]
            strategy = "embedding_similarity"
            "#,
        )
        .unwrap();

        assert_eq!(config.index.bm25.variant, Bm25Variant::Okapi);
        assert_eq!(config.index.bm25.k1, 1.5);
        assert_eq!(config.retrieval.default_top_k, 3);
        assert_eq!(config.retrieval.default_threshold, 0.1);
        assert_eq!(config.retrieval.idf_scope, IdfScope::Corpus);
        assert_eq!(config.retrieval.synonyms["ауыл"], vec!["село".to_string()]);
        assert_eq!(config.rerank.strategy, RerankStrategy::EmbeddingSimilarity);
        assert_eq!(config.fusion.weight_vector, 0.7);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = QazConfig::parse("[retrieval\ndefault_top_k = ").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[fusion]\nweight_text = 0.5").unwrap();

        let config = QazConfig::load(file.path()).unwrap();
        assert_eq!(config.fusion.weight_text, 0.5);
        assert_eq!(config.fusion.weight_vector, 0.7);
    }
}
