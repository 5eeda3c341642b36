//! BM25 family scoring over tokenized passages.

use std::collections::HashMap;

use qaz_core::{Bm25Config, Bm25Variant, QazError, Result};

/// Term frequencies and length of one tokenized passage.
#[derive(Debug, Clone, Default)]
pub struct DocumentTerms {
    freqs: HashMap<String, u32>,
    len: usize,
}

impl DocumentTerms {
    /// Count terms in a token sequence.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        let mut freqs: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *freqs.entry(token.as_ref().to_string()).or_default() += 1;
        }
        Self {
            freqs,
            len: tokens.len(),
        }
    }

    /// Occurrences of `term`.
    pub fn tf(&self, term: &str) -> u32 {
        self.freqs.get(term).copied().unwrap_or(0)
    }

    /// Passage length in tokens.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the passage has no tokens.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Distinct terms of the passage.
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.freqs.keys().map(String::as_str)
    }
}

/// Collection statistics plus the scoring formula.
///
/// Fit over any set of passages: the full snapshot, or only the candidates
/// shortlisted for one query.
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    config: Bm25Config,
    idf: HashMap<String, f64>,
    avgdl: f64,
    corpus_size: usize,
}

impl Bm25Scorer {
    /// Compute document frequencies, IDF and average length over `docs`.
    pub fn fit<'a, I>(config: &Bm25Config, docs: I) -> Self
    where
        I: IntoIterator<Item = &'a DocumentTerms>,
    {
        let mut doc_freqs: HashMap<&'a str, usize> = HashMap::new();
        let mut corpus_size = 0usize;
        let mut total_len = 0usize;

        for doc in docs {
            corpus_size += 1;
            total_len += doc.len();
            for term in doc.terms() {
                *doc_freqs.entry(term).or_default() += 1;
            }
        }

        let avgdl = if corpus_size == 0 {
            0.0
        } else {
            total_len as f64 / corpus_size as f64
        };

        let n = corpus_size as f64;
        let idf = match config.variant {
            Bm25Variant::Okapi => {
                let mut idf: HashMap<String, f64> = doc_freqs
                    .iter()
                    .map(|(term, &df)| {
                        let df = df as f64;
                        (term.to_string(), (n - df + 0.5).ln() - (df + 0.5).ln())
                    })
                    .collect();

                // Terms present in most passages are floored to a fraction
                // of the average IDF instead of keeping their negative weight.
                // The floor itself never goes below zero.
                if !idf.is_empty() {
                    let average = idf.values().sum::<f64>() / idf.len() as f64;
                    let floor = config.epsilon * average.max(0.0);
                    for value in idf.values_mut() {
                        if *value < 0.0 {
                            *value = floor;
                        }
                    }
                }
                idf
            }
            Bm25Variant::Plus => doc_freqs
                .iter()
                .map(|(term, &df)| (term.to_string(), ((n + 1.0) / df as f64).ln()))
                .collect(),
        };

        Self {
            config: config.clone(),
            idf,
            avgdl,
            corpus_size,
        }
    }

    /// Score one passage against the query tokens.
    ///
    /// Repeated query tokens contribute repeatedly; tokens unseen in the
    /// fitted passages contribute nothing.
    pub fn score<S: AsRef<str>>(&self, query: &[S], doc: &DocumentTerms) -> f64 {
        let Bm25Config { k1, b, delta, .. } = self.config;
        let length_ratio = if self.avgdl > 0.0 {
            doc.len() as f64 / self.avgdl
        } else {
            1.0
        };
        let norm = k1 * (1.0 - b + b * length_ratio);

        query
            .iter()
            .filter_map(|q| self.idf.get(q.as_ref()).map(|&idf| (idf, doc.tf(q.as_ref()))))
            .map(|(idf, tf)| {
                let tf = tf as f64;
                let saturated = tf * (k1 + 1.0) / (tf + norm);
                match self.config.variant {
                    Bm25Variant::Okapi => idf * saturated,
                    Bm25Variant::Plus => idf * (delta + saturated),
                }
            })
            .sum()
    }

    /// Score and reject non-finite results.
    pub fn score_checked<S: AsRef<str>>(&self, query: &[S], doc: &DocumentTerms) -> Result<f64> {
        let score = self.score(query, doc);
        if score.is_finite() {
            Ok(score)
        } else {
            Err(QazError::scoring(format!(
                "non-finite BM25 score {} (avgdl={}, corpus_size={})",
                score, self.avgdl, self.corpus_size
            )))
        }
    }

    /// IDF of a term, if it occurs in the fitted passages.
    pub fn idf(&self, term: &str) -> Option<f64> {
        self.idf.get(term).copied()
    }

    /// Average passage length in tokens.
    pub fn avgdl(&self) -> f64 {
        self.avgdl
    }

    /// Number of passages the statistics were fitted on.
    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    pub fn variant(&self) -> Bm25Variant {
        self.config.variant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn docs(texts: &[&str]) -> Vec<DocumentTerms> {
        texts
            .iter()
            .map(|t| {
                let tokens: Vec<&str> = t.split_whitespace().collect();
                DocumentTerms::from_tokens(&tokens)
            })
            .collect()
    }

    fn config(variant: Bm25Variant) -> Bm25Config {
        Bm25Config {
            variant,
            ..Bm25Config::default()
        }
    }

    #[test]
    fn test_document_terms() {
        let doc = DocumentTerms::from_tokens(&["қала", "ел", "қала"]);
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.tf("қала"), 2);
        assert_eq!(doc.tf("жер"), 0);
        assert_eq!(doc.terms().count(), 2);
    }

    #[test]
    fn test_plus_idf() {
        let docs = docs(&["a b", "a c", "a d"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Plus), &docs);
        assert!((scorer.idf("a").unwrap() - (4.0f64 / 3.0).ln()).abs() < 1e-12);
        assert!((scorer.idf("b").unwrap() - 4.0f64.ln()).abs() < 1e-12);
        assert_eq!(scorer.idf("z"), None);
        assert!((scorer.avgdl() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_okapi_negative_idf_floor() {
        let docs = docs(&["a b", "a c", "a d", "e f", "g h"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Okapi), &docs);

        let raw_a = 2.5f64.ln() - 3.5f64.ln();
        let raw_b = 4.5f64.ln() - 1.5f64.ln();
        let average = (raw_a + 7.0 * raw_b) / 8.0;

        assert!(raw_a < 0.0);
        assert!((scorer.idf("a").unwrap() - 0.25 * average).abs() < 1e-12);
        assert!((scorer.idf("b").unwrap() - raw_b).abs() < 1e-12);
    }

    #[test]
    fn test_okapi_floor_is_never_negative() {
        // Every term is in most passages, so the average IDF is negative.
        let docs = docs(&["a b", "a c", "a d"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Okapi), &docs);

        assert_eq!(scorer.idf("a"), Some(0.0));
        assert!(scorer.idf("b").unwrap() > 0.0);
        for doc in &docs {
            assert!(scorer.score(&["a", "b"], doc) >= 0.0);
        }
    }

    #[test]
    fn test_plus_floor_for_absent_term() {
        let docs = docs(&["a b", "c d"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Plus), &docs);
        // "a" is absent from the second passage but still scores idf * delta.
        let score = scorer.score(&["a"], &docs[1]);
        assert!((score - 3.0f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_tokens_score_zero() {
        let docs = docs(&["a b", "c d"]);
        for variant in [Bm25Variant::Okapi, Bm25Variant::Plus] {
            let scorer = Bm25Scorer::fit(&config(variant), &docs);
            assert_eq!(scorer.score(&["zzz"], &docs[0]), 0.0);
        }
    }

    #[test]
    fn test_repeated_query_tokens_count_twice() {
        let docs = docs(&["a b", "c d"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Plus), &docs);
        let once = scorer.score(&["a"], &docs[0]);
        let twice = scorer.score(&["a", "a"], &docs[0]);
        assert!((twice - 2.0 * once).abs() < 1e-12);
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let docs = docs(&["common rare", "common x", "common y", "common z"]);
        let scorer = Bm25Scorer::fit(&config(Bm25Variant::Plus), &docs);
        assert!(scorer.idf("rare").unwrap() > scorer.idf("common").unwrap());
    }

    #[test]
    fn test_length_normalization() {
        let docs = docs(&["a b", "a b c d e f g h", "x y", "x z", "y z"]);
        for variant in [Bm25Variant::Okapi, Bm25Variant::Plus] {
            let scorer = Bm25Scorer::fit(&config(variant), &docs);
            let short = scorer.score(&["b"], &docs[0]);
            let long = scorer.score(&["b"], &docs[1]);
            assert!(short > long, "{:?}: {} <= {}", variant, short, long);
        }
    }

    #[test]
    fn test_empty_fit() {
        let scorer = Bm25Scorer::fit(&Bm25Config::default(), std::iter::empty());
        assert_eq!(scorer.corpus_size(), 0);
        let doc = DocumentTerms::from_tokens(&["a"]);
        assert_eq!(scorer.score_checked(&["a"], &doc).unwrap(), 0.0);
    }

    proptest! {
        #[test]
        fn score_is_monotonic_in_term_frequency(
            tf in 1usize..8,
            filler in 0usize..6,
            others in proptest::collection::vec("[a-e]{1,3}( [a-e]{1,3}){0,6}", 1..5),
            okapi in any::<bool>(),
        ) {
            let variant = if okapi { Bm25Variant::Okapi } else { Bm25Variant::Plus };
            let build = |tf: usize| {
                let mut tokens = vec!["target".to_string(); tf];
                tokens.extend((0..filler).map(|i| format!("f{}", i)));
                let mut all = vec![DocumentTerms::from_tokens(&tokens)];
                all.extend(others.iter().map(|o| {
                    let t: Vec<&str> = o.split_whitespace().collect();
                    DocumentTerms::from_tokens(&t)
                }));
                let scorer = Bm25Scorer::fit(&config(variant), &all);
                scorer.score(&["target"], &all[0])
            };

            prop_assert!(build(tf + 1) >= build(tf));
        }
    }
}
