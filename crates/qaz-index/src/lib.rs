//! qaz-index - Corpus snapshots and BM25 scoring
//!
//! A [`CorpusIndex`] cleans, deduplicates and tokenizes a passage collection
//! once, producing an immutable [`CorpusSnapshot`] that holds the tokenized
//! passages, an [`InvertedIndex`] and a full-corpus [`Bm25Scorer`].
//!
//! # Example
//!
//! ```rust
//! use qaz_core::{IndexConfig, Passage};
//! use qaz_index::CorpusIndex;
//!
//! let index = CorpusIndex::new(IndexConfig::default()).unwrap();
//! let snapshot = index
//!     .build(vec![Passage::new(1u64, "Астана - Қазақстанның елордасы")])
//!     .unwrap();
//! assert_eq!(snapshot.len(), 1);
//! ```

mod bm25;
mod inverted;
mod snapshot;
mod stats;

pub use bm25::{Bm25Scorer, DocumentTerms};
pub use inverted::InvertedIndex;
pub use snapshot::{CorpusIndex, CorpusSnapshot};
pub use stats::{CorpusStats, LengthStats, TokenStats};

// Re-export for convenience
pub use qaz_core::{Bm25Config, Bm25Variant, IndexConfig};
