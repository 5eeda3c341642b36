//! Query expansion with a static synonym table.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use qaz_text::{tokenize, TokenizeOptions};

/// Built-in Kazakh synonym table, in surface form.
pub static DEFAULT_SYNONYMS: Lazy<BTreeMap<String, Vec<String>>> = Lazy::new(|| {
    let table: [(&str, &[&str]); 9] = [
        ("қала", &["қалалар", "қаласы", "шаһар"]),
        ("тарих", &["тарихи", "тарихта", "тарихшы"]),
        ("астана", &["бас қала", "елорда"]),
        ("мектеп", &["оқу орны", "білім беру"]),
        ("университет", &["оқу орны", "жоғары оқу орны"]),
        ("кітап", &["кітаптар", "оқулық"]),
        ("әдебиет", &["шығарма", "шығармалар"]),
        ("ел", &["мемлекет", "отан", "ұлт"]),
        ("жыл", &["жылдар", "жылдық"]),
    ];
    table
        .into_iter()
        .map(|(key, values)| {
            (
                key.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            )
        })
        .collect()
});

/// Synonym table keyed and valued in token space.
///
/// Keys and synonyms go through the same tokenizer as the corpus, so an
/// expansion can only ever add tokens that could match an indexed passage.
/// Multi-word synonyms contribute one token per word; expansions equal to the
/// key itself are dropped.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    /// Build a table from surface-form entries.
    pub fn new(raw: &BTreeMap<String, Vec<String>>, options: TokenizeOptions) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();

        for (key, values) in raw {
            let key_tokens = tokenize(key, options);
            let [key_token] = key_tokens.as_slice() else {
                warn!("Skipping synonym key {:?}: tokenizes to {:?}", key, key_tokens);
                continue;
            };

            let expansions = entries.entry(key_token.clone()).or_default();
            for token in values.iter().flat_map(|v| tokenize(v, options)) {
                if token != *key_token && !expansions.contains(&token) {
                    expansions.push(token);
                }
            }
        }

        entries.retain(|_, expansions| !expansions.is_empty());
        debug!("Synonym table ready: {} keys", entries.len());

        Self { entries }
    }

    /// The built-in table, or `overrides` when non-empty.
    pub fn from_config(overrides: &BTreeMap<String, Vec<String>>, options: TokenizeOptions) -> Self {
        if overrides.is_empty() {
            Self::new(&DEFAULT_SYNONYMS, options)
        } else {
            Self::new(overrides, options)
        }
    }

    /// Synonym tokens for one query token.
    pub fn get(&self, token: &str) -> Option<&[String]> {
        self.entries.get(token).map(Vec::as_slice)
    }

    /// `tokens` followed by the synonyms of each token, in query order.
    pub fn expand(&self, tokens: &[String]) -> Vec<String> {
        let mut expanded = tokens.to_vec();
        for token in tokens {
            if let Some(synonyms) = self.entries.get(token) {
                expanded.extend(synonyms.iter().cloned());
            }
        }
        expanded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
