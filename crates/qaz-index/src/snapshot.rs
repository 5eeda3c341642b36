//! Corpus snapshot construction.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, warn};

use qaz_core::{content_hash, IndexConfig, Passage, PassageId, QazError, Result, SnapshotId};
use qaz_text::{tokenize, CleanReport, CleanVerdict, PassageCleaner, TokenizeOptions};

use crate::bm25::{Bm25Scorer, DocumentTerms};
use crate::inverted::InvertedIndex;

/// Builds immutable corpus snapshots.
#[derive(Debug, Clone)]
pub struct CorpusIndex {
    config: IndexConfig,
    cleaner: PassageCleaner,
}

impl CorpusIndex {
    /// Create an index builder, validating the configuration.
    pub fn new(config: IndexConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self {
            cleaner: PassageCleaner::new(&config),
            config,
        })
    }

    /// Tokenizer options shared by passages and queries.
    pub fn tokenize_options(&self) -> TokenizeOptions {
        tokenize_options(&self.config)
    }

    /// Clean, deduplicate, tokenize and index `passages`.
    ///
    /// Fails with [`QazError::EmptyCorpus`] if no passage survives cleaning.
    pub fn build(&self, passages: Vec<Passage>) -> Result<CorpusSnapshot> {
        let start = Instant::now();
        let mut report = CleanReport::default();
        let mut seen_text: HashSet<[u8; 32]> = HashSet::new();
        let mut seen_ids: HashSet<PassageId> = HashSet::new();
        let mut kept: Vec<Passage> = Vec::with_capacity(passages.len());

        for mut passage in passages {
            let verdict = self.cleaner.clean(&passage.text);
            report.record(&verdict);

            let text = match verdict {
                CleanVerdict::Kept { text, .. } => text,
                CleanVerdict::TooShort | CleanVerdict::NoSpecialChars => {
                    warn!("Dropped passage {}: {:?}", passage.id, verdict);
                    continue;
                }
            };

            let hash = content_hash(&text);
            if !seen_text.insert(hash) {
                report.record_duplicate();
                continue;
            }
            if !seen_ids.insert(passage.id.clone()) {
                warn!("Duplicate passage id {}, keeping first occurrence", passage.id);
                report.record_duplicate();
                continue;
            }

            passage.text = text;
            passage.content_hash = Some(hash);
            kept.push(passage);
        }

        info!(
            "Cleaned passages: {} in, {} kept, {} too short, {} without Kazakh letters, {} truncated, {} duplicates",
            report.input,
            report.kept,
            report.too_short,
            report.no_special_chars,
            report.truncated,
            report.duplicates
        );

        if kept.is_empty() {
            return Err(QazError::empty_corpus(format!(
                "0 of {} passages survived cleaning",
                report.input
            )));
        }

        let options = self.tokenize_options();
        let tokens: Vec<Vec<String>> = kept
            .par_iter()
            .map(|passage| tokenize(&passage.text, options))
            .collect();

        let terms: Vec<DocumentTerms> = tokens
            .par_iter()
            .map(|t| DocumentTerms::from_tokens(t))
            .collect();

        let mut inverted = InvertedIndex::new();
        for (position, passage_tokens) in tokens.iter().enumerate() {
            inverted.insert(position, passage_tokens);
        }

        let scorer = Bm25Scorer::fit(&self.config.bm25, &terms);
        let positions = kept
            .iter()
            .enumerate()
            .map(|(position, passage)| (passage.id.clone(), position))
            .collect();

        let snapshot = CorpusSnapshot {
            id: SnapshotId::new(),
            passages: kept,
            tokens,
            terms,
            inverted,
            scorer,
            positions,
            options,
            config: self.config.clone(),
            report,
        };

        info!(
            "Built snapshot {}: {} passages, {} unique tokens, {:?} BM25 in {:?}",
            snapshot.id,
            snapshot.len(),
            snapshot.inverted.len(),
            self.config.bm25.variant,
            start.elapsed()
        );

        Ok(snapshot)
    }
}

fn tokenize_options(config: &IndexConfig) -> TokenizeOptions {
    TokenizeOptions {
        remove_stopwords: config.remove_stopwords,
        apply_stemming: config.use_stemming,
    }
}

fn validate(config: &IndexConfig) -> Result<()> {
    let bm25 = &config.bm25;
    if !(bm25.k1.is_finite() && bm25.k1 >= 0.0) {
        return Err(QazError::index_build(format!("k1 must be >= 0, got {}", bm25.k1)));
    }
    if !(0.0..=1.0).contains(&bm25.b) {
        return Err(QazError::index_build(format!("b must be in [0, 1], got {}", bm25.b)));
    }
    if config.max_chars < config.min_chars {
        return Err(QazError::index_build(format!(
            "max_chars ({}) is below min_chars ({})",
            config.max_chars, config.min_chars
        )));
    }
    Ok(())
}

/// An immutable, fully indexed passage collection.
///
/// Positions are stable for the snapshot's lifetime. Share it behind an
/// `Arc`; nothing in it is mutable.
#[derive(Debug)]
pub struct CorpusSnapshot {
    id: SnapshotId,
    passages: Vec<Passage>,
    tokens: Vec<Vec<String>>,
    terms: Vec<DocumentTerms>,
    inverted: InvertedIndex,
    scorer: Bm25Scorer,
    positions: HashMap<PassageId, usize>,
    options: TokenizeOptions,
    config: IndexConfig,
    report: CleanReport,
}

impl CorpusSnapshot {
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// Number of passages.
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    pub fn passage(&self, position: usize) -> Option<&Passage> {
        self.passages.get(position)
    }

    pub fn passages(&self) -> &[Passage] {
        &self.passages
    }

    /// Tokenized form of the passage at `position`.
    pub fn tokens(&self, position: usize) -> Option<&[String]> {
        self.tokens.get(position).map(Vec::as_slice)
    }

    pub fn terms(&self, position: usize) -> Option<&DocumentTerms> {
        self.terms.get(position)
    }

    pub fn inverted_index(&self) -> &InvertedIndex {
        &self.inverted
    }

    /// Scorer fitted on the whole snapshot.
    pub fn scorer(&self) -> &Bm25Scorer {
        &self.scorer
    }

    /// Scorer fitted on `positions` only.
    pub fn scoped_scorer(&self, positions: &[usize]) -> Bm25Scorer {
        Bm25Scorer::fit(
            &self.config.bm25,
            positions.iter().filter_map(|&p| self.terms.get(p)),
        )
    }

    pub fn position_of(&self, id: &PassageId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// Tokenizer options the passages were indexed with.
    pub fn tokenize_options(&self) -> TokenizeOptions {
        self.options
    }

    pub fn clean_report(&self) -> &CleanReport {
        &self.report
    }
}
