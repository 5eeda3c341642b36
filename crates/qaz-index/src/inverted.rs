//! Token to passage-position postings.

use std::collections::{BTreeSet, HashMap};

/// Inverted index over distinct passage tokens.
///
/// Position `p` is listed under token `t` iff `t` occurs at least once in the
/// tokenized form of passage `p`.
#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, BTreeSet<usize>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one posting per distinct token of the passage at `position`.
    pub fn insert<S: AsRef<str>>(&mut self, position: usize, tokens: &[S]) {
        for token in tokens {
            // BTreeSet ignores repeats, so term frequency never adds postings.
            self.postings
                .entry(token.as_ref().to_string())
                .or_default()
                .insert(position);
        }
    }

    /// Postings for one token.
    pub fn get(&self, token: &str) -> Option<&BTreeSet<usize>> {
        self.postings.get(token)
    }

    /// Union of the postings of all `tokens`, in position order.
    pub fn candidates<S: AsRef<str>>(&self, tokens: &[S]) -> BTreeSet<usize> {
        let mut union = BTreeSet::new();
        for token in tokens {
            if let Some(postings) = self.postings.get(token.as_ref()) {
                union.extend(postings.iter().copied());
            }
        }
        union
    }

    /// Number of distinct tokens.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_postings() {
        let mut index = InvertedIndex::new();
        index.insert(0, &["қала", "қала", "ел"]);
        index.insert(1, &["ел"]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("қала").unwrap().len(), 1);
        assert_eq!(
            index.get("ел").unwrap().iter().copied().collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(index.get("жер").is_none());
    }

    #[test]
    fn test_candidates_union() {
        let mut index = InvertedIndex::new();
        index.insert(0, &["a", "b"]);
        index.insert(1, &["b", "c"]);
        index.insert(2, &["d"]);

        let union = index.candidates(&["a", "c", "missing"]);
        assert_eq!(union.into_iter().collect::<Vec<_>>(), vec![0, 1]);
        assert!(index.candidates(&["missing"]).is_empty());
        assert!(index.candidates::<&str>(&[]).is_empty());
    }
}
