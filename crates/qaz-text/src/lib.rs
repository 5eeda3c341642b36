//! qaz-text - Kazakh text processing
//!
//! This crate turns raw text into the token streams the corpus index and the
//! lexical retriever score against.
//!
//! # Components
//!
//! - [`tokenize`]: normalization, character filtering, optional stop-word
//!   removal and single-suffix stemming.
//!
//! - [`PassageCleaner`]: whitespace/markup cleanup and the length and
//!   language heuristics applied to raw passages before indexing.
//!
//! # Example
//!
//! ```rust
//! use qaz_text::{tokenize, TokenizeOptions};
//!
//! let tokens = tokenize("Қалалар мен ауылдар", TokenizeOptions::indexing());
//! assert_eq!(tokens, vec!["қала", "мен", "ауыл"]);
//! ```

mod clean;
mod tokenizer;

pub use clean::{CleanReport, CleanVerdict, PassageCleaner};
pub use tokenizer::{
    count_special_chars, is_special_char, normalize, stem, token_metrics, tokenize,
    TokenMetrics, TokenizeOptions, SPECIAL_CHARS, STEMMING_EXCEPTIONS, STOPWORDS, SUFFIXES,
};
