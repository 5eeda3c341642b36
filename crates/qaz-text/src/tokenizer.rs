//! Kazakh-aware tokenizer.
//!
//! Text is lowercased, decomposed (NFKD) and stripped of combining marks, then
//! every character outside letters, digits, whitespace, `-` and the Kazakh
//! special letters is replaced by a space before splitting on whitespace.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokenizers::normalizers::{StripAccents, NFKD};
use tokenizers::{NormalizedString, Normalizer};
use tracing::warn;

/// Letters used by Kazakh that plain Russian Cyrillic and Latin lack.
pub const SPECIAL_CHARS: [char; 9] = ['ә', 'і', 'ң', 'ғ', 'ү', 'ұ', 'қ', 'ө', 'һ'];

/// Short function words dropped when stop-word removal is enabled.
pub const STOPWORDS: &[&str] = &[
    "бұл", "сол", "мен", "сен", "ол", "біз", "сіз", "және", "өте", "тек", "содан", "сонда",
];

/// Agglutinative suffixes in stripping priority order.
pub const SUFFIXES: &[&str] = &[
    "лар", "лер", "дар", "дер", "тар", "тер", "шыл", "шіл", "мен", "бен", "пен", "да", "де",
    "та", "те",
];

/// Tokens that look inflected but must be kept whole.
pub const STEMMING_EXCEPTIONS: &[&str] = &[
    "әріптер",
    "нүктелер",
    "үтірлер",
    "тілінде",
    "кітаптар",
    "адамдар",
];

/// Tokenizer switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TokenizeOptions {
    pub remove_stopwords: bool,
    pub apply_stemming: bool,
}

impl TokenizeOptions {
    /// Options used for corpus passages and queries: stemming on.
    pub fn indexing() -> Self {
        Self {
            remove_stopwords: false,
            apply_stemming: true,
        }
    }
}

/// Whether `c` is one of the Kazakh special letters.
pub fn is_special_char(c: char) -> bool {
    SPECIAL_CHARS.contains(&c)
}

/// Count Kazakh special letters in `text`.
pub fn count_special_chars(text: &str) -> usize {
    text.chars().filter(|&c| is_special_char(c)).count()
}

/// Lowercase and fold diacritics.
pub fn normalize(text: &str) -> tokenizers::Result<String> {
    let mut normalized = NormalizedString::from(text.to_lowercase().as_str());
    NFKD.normalize(&mut normalized)?;
    StripAccents.normalize(&mut normalized)?;
    Ok(normalized.get().to_string())
}

/// Split text into normalized tokens.
///
/// Never fails: if normalization errors, falls back to a lowercase
/// whitespace split so a single bad passage cannot break indexing.
pub fn tokenize(text: &str, options: TokenizeOptions) -> Vec<String> {
    let normalized = match normalize(text) {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("Tokenization fallback: {}", e);
            return text.to_lowercase().split_whitespace().map(String::from).collect();
        }
    };

    let filtered: String = normalized
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' || is_special_char(c) {
                c
            } else {
                ' '
            }
        })
        .collect();

    filtered
        .split_whitespace()
        .filter(|token| !(options.remove_stopwords && STOPWORDS.contains(token)))
        .map(|token| {
            if options.apply_stemming {
                stem(token).to_string()
            } else {
                token.to_string()
            }
        })
        .collect()
}

/// Strip at most one suffix from `token`.
///
/// The first suffix in [`SUFFIXES`] order that leaves a stem of at least
/// three characters wins.
pub fn stem(token: &str) -> &str {
    if STEMMING_EXCEPTIONS.contains(&token) {
        return token;
    }

    let len = token.chars().count();
    for suffix in SUFFIXES {
        if token.ends_with(suffix) && len > suffix.chars().count() + 2 {
            return &token[..token.len() - suffix.len()];
        }
    }

    token
}

/// Summary statistics over a token sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub total_tokens: usize,
    pub unique_tokens: usize,
    pub avg_token_length: f64,
    /// Tokens containing at least one Kazakh special letter.
    pub special_char_tokens: usize,
}

/// Compute [`TokenMetrics`] for `tokens`.
pub fn token_metrics<S: AsRef<str>>(tokens: &[S]) -> TokenMetrics {
    let unique: HashSet<&str> = tokens.iter().map(|t| t.as_ref()).collect();
    let total_chars: usize = tokens.iter().map(|t| t.as_ref().chars().count()).sum();

    TokenMetrics {
        total_tokens: tokens.len(),
        unique_tokens: unique.len(),
        avg_token_length: if tokens.is_empty() {
            0.0
        } else {
            total_chars as f64 / tokens.len() as f64
        },
        special_char_tokens: tokens
            .iter()
            .filter(|t| t.as_ref().chars().any(is_special_char))
            .count(),
    }
}
