//! BM25 lexical retrieval over a swappable corpus snapshot.

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use qaz_core::{
    Bm25Variant, CorpusSource, IdfScope, IndexConfig, Passage, PassageId, QazError, Result,
    RetrievalConfig, RetrievalResult, SnapshotId,
};
use qaz_index::{Bm25Scorer, CorpusIndex, CorpusSnapshot, CorpusStats};
use qaz_text::{count_special_chars, tokenize};

use crate::cache::{CacheKey, QueryCache};
use crate::synonyms::SynonymTable;

/// How many candidates a filtered search retrieves before filtering.
const FILTER_POOL: usize = 100;

/// How many tokens [`QueryAnalysis::common_tokens`] reports.
const COMMON_TOKENS: usize = 10;

/// Per-call retrieval overrides; `None` falls back to the configured default.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RetrieveParams {
    pub top_k: Option<usize>,
    pub threshold: Option<f64>,
    pub expand_query: Option<bool>,
}

impl RetrieveParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn expand_query(mut self, expand_query: bool) -> Self {
        self.expand_query = Some(expand_query);
        self
    }
}

/// Post-retrieval filters for [`LexicalRetriever::search_with_filters`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Minimum passage length in characters.
    pub min_length: Option<usize>,
    /// Maximum passage length in characters.
    pub max_length: Option<usize>,
    /// Minimum number of Kazakh special letters.
    pub min_special_chars: Option<usize>,
    pub top_k: Option<usize>,
}

/// Breakdown of how a query was processed.
#[derive(Debug, Clone, Serialize)]
pub struct QueryAnalysis {
    pub query: String,
    pub tokenized_query: Vec<String>,
    pub expanded_query: Vec<String>,
    pub results: Vec<RetrievalResult>,
    /// Most frequent tokens across the results' token samples.
    pub common_tokens: Vec<(String, usize)>,
    #[serde(with = "duration_secs")]
    pub execution_time: Duration,
}

/// Retriever counters and snapshot summary.
#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub snapshot_id: String,
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cached_entries: u64,
    #[serde(with = "duration_secs")]
    pub last_query_time: Duration,
    pub passages: usize,
    pub unique_tokens: usize,
}

/// BM25 lexical retriever.
///
/// Queries run against an immutable [`CorpusSnapshot`]; [`reload`](Self::reload)
/// builds a replacement and swaps it in, so in-flight queries finish on the
/// snapshot they started with.
pub struct LexicalRetriever {
    index: CorpusIndex,
    snapshot: RwLock<Arc<CorpusSnapshot>>,
    synonyms: SynonymTable,
    cache: QueryCache,
    config: RetrievalConfig,
    total_queries: AtomicU64,
    last_query_micros: AtomicU64,
}

impl LexicalRetriever {
    /// Index `passages` and create a retriever over them.
    pub fn new(
        index_config: IndexConfig,
        config: RetrievalConfig,
        passages: Vec<Passage>,
    ) -> Result<Self> {
        let index = CorpusIndex::new(index_config)?;
        let snapshot = index.build(passages)?;
        let synonyms = SynonymTable::from_config(&config.synonyms, index.tokenize_options());

        Ok(Self {
            cache: QueryCache::new(config.cache_capacity),
            snapshot: RwLock::new(Arc::new(snapshot)),
            index,
            synonyms,
            config,
            total_queries: AtomicU64::new(0),
            last_query_micros: AtomicU64::new(0),
        })
    }

    /// Load passages from `source` and index them.
    pub fn from_source(
        source: &dyn CorpusSource,
        index_config: IndexConfig,
        config: RetrievalConfig,
    ) -> Result<Self> {
        Self::new(index_config, config, source.load()?)
    }

    /// The snapshot new queries run against.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Replace the corpus.
    ///
    /// On failure the current snapshot stays in service.
    pub fn reload(&self, passages: Vec<Passage>) -> Result<SnapshotId> {
        let snapshot = self.index.build(passages).map_err(|e| {
            error!("Reload failed, keeping snapshot {}: {}", self.snapshot().id(), e);
            if e.is_build_failure() {
                e
            } else {
                QazError::index_build(e.to_string())
            }
        })?;

        let id = snapshot.id();
        *self.snapshot.write() = Arc::new(snapshot);
        self.cache.clear();

        info!("Swapped in snapshot {}", id);
        Ok(id)
    }

    /// Retrieve the best passages for `query`.
    ///
    /// Never fails: blank queries, queries with no indexed tokens and scoring
    /// errors all produce an empty list.
    pub fn retrieve(&self, query: &str, params: RetrieveParams) -> Vec<RetrievalResult> {
        let start = Instant::now();
        self.total_queries.fetch_add(1, Ordering::Relaxed);

        let results = self.retrieve_uncounted(query, params);

        self.last_query_micros
            .store(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        results
    }

    fn retrieve_uncounted(&self, query: &str, params: RetrieveParams) -> Vec<RetrievalResult> {
        if query.trim().is_empty() {
            warn!("Empty query received");
            return Vec::new();
        }

        let snapshot = self.snapshot();
        let top_k = params.top_k.unwrap_or(self.config.default_top_k);
        let threshold = params.threshold.unwrap_or(self.config.default_threshold);
        let expand = params.expand_query.unwrap_or(self.config.expand_query);

        let key = CacheKey::new(snapshot.id(), query, top_k, threshold, expand);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit for {:?}", query);
            return cached.as_ref().clone();
        }

        match self.search_snapshot(&snapshot, query, top_k, threshold, expand) {
            Ok(results) => {
                debug!("Retrieved {} results for {:?}", results.len(), query);
                self.cache.insert(key, Arc::new(results.clone()));
                results
            }
            Err(e) => {
                error!("Retrieval failed for {:?}: {}", query, e);
                Vec::new()
            }
        }
    }

    fn query_tokens(&self, snapshot: &CorpusSnapshot, query: &str, expand: bool) -> Vec<String> {
        let tokens = tokenize(query, snapshot.tokenize_options());
        if expand {
            self.synonyms.expand(&tokens)
        } else {
            tokens
        }
    }

    fn search_snapshot(
        &self,
        snapshot: &CorpusSnapshot,
        query: &str,
        top_k: usize,
        threshold: f64,
        expand: bool,
    ) -> Result<Vec<RetrievalResult>> {
        let tokens = self.query_tokens(snapshot, query, expand);
        if tokens.is_empty() {
            debug!("No tokens in query {:?}", query);
            return Ok(Vec::new());
        }

        let candidates: Vec<usize> = snapshot
            .inverted_index()
            .candidates(&tokens)
            .into_iter()
            .collect();
        if candidates.is_empty() {
            debug!("No candidates for tokens {:?}", tokens);
            return Ok(Vec::new());
        }

        let scoped;
        // Okapi IDF is not positive for terms in half or more of the fitted
        // passages, which a candidate subset almost always is. Only Plus
        // refits on candidates.
        let scoped_idf = self.config.idf_scope == IdfScope::Candidates
            && snapshot.scorer().variant() == Bm25Variant::Plus;
        let scorer = if scoped_idf && candidates.len() < snapshot.len() {
            scoped = snapshot.scoped_scorer(&candidates);
            &scoped
        } else {
            snapshot.scorer()
        };

        debug!(
            "Scoring {} of {} passages for {} query tokens",
            candidates.len(),
            snapshot.len(),
            tokens.len()
        );

        let scored = score_positions(snapshot, scorer, &tokens, &candidates)?;
        Ok(self.select(snapshot, scored, top_k, threshold))
    }

    /// Rank, keep `top_k`, then drop scores below `threshold`.
    fn select(
        &self,
        snapshot: &CorpusSnapshot,
        mut scored: Vec<(usize, f64)>,
        top_k: usize,
        threshold: f64,
    ) -> Vec<RetrievalResult> {
        // Stable: equal scores stay in corpus order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .filter(|&(_, score)| score >= threshold)
            .filter_map(|(position, score)| self.result_at(snapshot, position, score))
            .collect()
    }

    fn result_at(
        &self,
        snapshot: &CorpusSnapshot,
        position: usize,
        score: f64,
    ) -> Option<RetrievalResult> {
        let passage = snapshot.passage(position)?;
        let tokens = snapshot.tokens(position)?;
        Some(RetrievalResult {
            passage_id: passage.id.clone(),
            text: passage.text.clone(),
            lexical_score: score,
            vector_score: None,
            tokens_sample: tokens
                .iter()
                .take(self.config.sample_tokens)
                .cloned()
                .collect(),
        })
    }

    /// Retrieve with default parameters and report how the query was read.
    pub fn query_analysis(&self, query: &str) -> QueryAnalysis {
        let start = Instant::now();
        let snapshot = self.snapshot();

        let tokenized_query = tokenize(query, snapshot.tokenize_options());
        let expanded_query = self.synonyms.expand(&tokenized_query);
        let results = self.retrieve(query, RetrieveParams::default());

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in results.iter().flat_map(|r| &r.tokens_sample) {
            *counts.entry(token.as_str()).or_default() += 1;
        }
        let mut common: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(token, count)| (token.to_string(), count))
            .collect();
        common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        common.truncate(COMMON_TOKENS);

        QueryAnalysis {
            query: query.to_string(),
            tokenized_query,
            expanded_query,
            results,
            common_tokens: common,
            execution_time: start.elapsed(),
        }
    }

    /// Retrieve a wide pool, then keep passages passing `filters`.
    pub fn search_with_filters(&self, query: &str, filters: &SearchFilters) -> Vec<RetrievalResult> {
        let pool = self.retrieve(query, RetrieveParams::new().top_k(FILTER_POOL));
        let top_k = filters.top_k.unwrap_or(self.config.default_top_k);

        pool.into_iter()
            .filter(|r| {
                let length = r.text.chars().count();
                filters.min_length.map_or(true, |min| length >= min)
                    && filters.max_length.map_or(true, |max| length <= max)
                    && filters
                        .min_special_chars
                        .map_or(true, |min| count_special_chars(&r.text) >= min)
            })
            .take(top_k)
            .collect()
    }

    /// Passages most similar to the passage `id`, scored with its own tokens
    /// as the query against the whole corpus. The source passage is excluded.
    pub fn similar_passages(&self, id: &PassageId, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let snapshot = self.snapshot();
        let source = snapshot
            .position_of(id)
            .ok_or_else(|| QazError::invalid_argument(format!("Unknown passage id {}", id)))?;
        let tokens = snapshot
            .tokens(source)
            .ok_or_else(|| QazError::internal(format!("No tokens at position {}", source)))?;

        let others: Vec<usize> = (0..snapshot.len()).filter(|&p| p != source).collect();
        let mut scored = score_positions(&snapshot, snapshot.scorer(), tokens, &others)?;
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(CmpOrdering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .filter_map(|(position, score)| self.result_at(&snapshot, position, score))
            .collect())
    }

    /// Run many queries in parallel with default threshold and expansion.
    pub fn batch_retrieve(
        &self,
        queries: &[String],
        top_k: usize,
    ) -> Vec<(String, Vec<RetrievalResult>)> {
        queries
            .par_iter()
            .map(|query| {
                let results = self.retrieve(query, RetrieveParams::new().top_k(top_k));
                (query.clone(), results)
            })
            .collect()
    }

    pub fn stats(&self) -> RetrieverStats {
        let snapshot = self.snapshot();
        RetrieverStats {
            snapshot_id: snapshot.id().to_string(),
            total_queries: self.total_queries.load(Ordering::Relaxed),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            cached_entries: self.cache.len(),
            last_query_time: Duration::from_micros(self.last_query_micros.load(Ordering::Relaxed)),
            passages: snapshot.len(),
            unique_tokens: snapshot.inverted_index().len(),
        }
    }

    /// Descriptive statistics of the current snapshot.
    pub fn corpus_stats(&self) -> CorpusStats {
        CorpusStats::collect(&self.snapshot())
    }
}

fn score_positions<S: AsRef<str>>(
    snapshot: &CorpusSnapshot,
    scorer: &Bm25Scorer,
    tokens: &[S],
    positions: &[usize],
) -> Result<Vec<(usize, f64)>> {
    positions
        .iter()
        .map(|&position| {
            let terms = snapshot
                .terms(position)
                .ok_or_else(|| QazError::scoring(format!("No terms at position {}", position)))?;
            Ok((position, scorer.score_checked(tokens, terms)?))
        })
        .collect()
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
