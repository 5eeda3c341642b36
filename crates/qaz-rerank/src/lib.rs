//! qaz-rerank - Second-stage reranking
//!
//! This crate rescores a small candidate list with a heavier model than the
//! lexical scorer.
//!
//! # Features
//!
//! - Cross-encoder strategy: `(query, passage)` pairs scored in fixed-size
//!   batches with truncation to the model's maximum length
//! - Embedding-similarity strategy: cosine similarity between query and
//!   passage embeddings
//! - ONNX Runtime adapters for both, run on the blocking thread pool
//! - Bounded concurrency and a per-call deadline
//! - Deterministic mock providers for tests and model-free runs
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use qaz_core::{PassageId, RerankConfig, RetrievalResult};
//! use qaz_rerank::{MockCrossEncoder, Reranker};
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! let reranker = Reranker::cross_encoder(Arc::new(MockCrossEncoder::new()), &RerankConfig::default());
//! let docs = vec![RetrievalResult {
//!     passage_id: PassageId::Num(0),
//!     text: "Astana is the capital city".to_string(),
//!     lexical_score: 3.0,
//!     vector_score: None,
//!     tokens_sample: Vec::new(),
//! }];
//! let results = runtime.block_on(reranker.rerank("capital", &docs, 5)).unwrap();
//! assert_eq!(results.len(), 1);
//! ```

mod mock;
mod onnx;
mod reranker;

pub use mock::{MockCrossEncoder, MockEmbedder};
pub use onnx::{OnnxCrossEncoder, OnnxEmbedder};
pub use reranker::{cosine_similarity, CrossEncoderReranker, EmbeddingReranker, Reranker};

// Re-export the provider traits for convenience
pub use qaz_core::{CrossEncoder, Embedder};
