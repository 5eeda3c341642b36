//! qaz-query - Retrieval and ranking
//!
//! This crate answers queries against a corpus snapshot.
//!
//! # Features
//!
//! - [`LexicalRetriever`]: BM25 over inverted-index candidates, with synonym
//!   expansion, a bounded result cache, statistics and atomic corpus reload
//! - [`fuse`] / [`fuse_results`]: linear fusion of lexical scores with
//!   vector similarities
//! - [`SearchEngine`]: retrieval, optional fusion and reranking with a
//!   deadline fallback
//! - [`JsonlCorpus`]: a JSON Lines corpus source
//!
//! # Example
//!
//! ```rust
//! use qaz_core::{IndexConfig, Passage, RetrievalConfig};
//! use qaz_query::{LexicalRetriever, RetrieveParams};
//!
//! let retriever = LexicalRetriever::new(
//!     IndexConfig::default(),
//!     RetrievalConfig::default(),
//!     vec![
//!         Passage::new(0u64, "Astana is the capital city"),
//!         Passage::new(1u64, "Almaty is the largest city"),
//!     ],
//! )
//! .unwrap();
//!
//! let results = retriever.retrieve("capital", RetrieveParams::default());
//! assert_eq!(results.len(), 1);
//! ```

mod cache;
mod corpus;
mod engine;
mod fusion;
mod lexical;
mod synonyms;

pub use cache::{CacheKey, QueryCache};
pub use corpus::JsonlCorpus;
pub use engine::{SearchEngine, SearchRequest, SearchResponse};
pub use fusion::{fuse, fuse_results, FusionWeights};
pub use lexical::{
    LexicalRetriever, QueryAnalysis, RetrieveParams, RetrieverStats, SearchFilters,
};
pub use synonyms::{SynonymTable, DEFAULT_SYNONYMS};
