//! Raw passage cleanup applied before indexing.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use qaz_core::IndexConfig;

use crate::tokenizer::count_special_chars;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static MARKUP_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Outcome of cleaning one raw passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanVerdict {
    /// Passage survives, possibly truncated.
    Kept { text: String, truncated: bool },
    /// Shorter than the minimum length after cleanup.
    TooShort,
    /// Long passage with too few Kazakh letters; most likely another language.
    NoSpecialChars,
}

/// Per-reason counters for a cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub input: usize,
    pub kept: usize,
    pub too_short: usize,
    pub no_special_chars: usize,
    pub truncated: usize,
    pub duplicates: usize,
}

impl CleanReport {
    /// Record a verdict.
    pub fn record(&mut self, verdict: &CleanVerdict) {
        self.input += 1;
        match verdict {
            CleanVerdict::Kept { truncated, .. } => {
                self.kept += 1;
                if *truncated {
                    self.truncated += 1;
                }
            }
            CleanVerdict::TooShort => self.too_short += 1,
            CleanVerdict::NoSpecialChars => self.no_special_chars += 1,
        }
    }

    /// Record a kept passage that turned out to be a duplicate.
    pub fn record_duplicate(&mut self) {
        self.kept -= 1;
        self.duplicates += 1;
    }
}

/// Passage cleaner with length and language heuristics.
#[derive(Debug, Clone)]
pub struct PassageCleaner {
    min_chars: usize,
    max_chars: usize,
    min_special_chars: usize,
    special_check_above: usize,
}

impl PassageCleaner {
    /// Create a cleaner from index configuration.
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            max_chars: config.max_chars,
            min_special_chars: config.min_special_chars,
            special_check_above: config.special_check_above,
        }
    }

    /// Clean one raw passage.
    pub fn clean(&self, raw: &str) -> CleanVerdict {
        let collapsed = WHITESPACE.replace_all(raw, " ");
        let cleaned = MARKUP_TAG.replace_all(collapsed.trim(), "");

        let len = cleaned.chars().count();
        if len < self.min_chars {
            return CleanVerdict::TooShort;
        }

        if len > self.special_check_above && count_special_chars(&cleaned) < self.min_special_chars
        {
            return CleanVerdict::NoSpecialChars;
        }

        if len > self.max_chars {
            return CleanVerdict::Kept {
                text: cleaned.chars().take(self.max_chars).collect(),
                truncated: true,
            };
        }

        CleanVerdict::Kept {
            text: cleaned.into_owned(),
            truncated: false,
        }
    }
}

impl Default for PassageCleaner {
    fn default() -> Self {
        Self::new(&IndexConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kept(verdict: CleanVerdict) -> String {
        match verdict {
            CleanVerdict::Kept { text, .. } => text,
            other => panic!("expected kept passage, got {:?}", other),
        }
    }

    #[test]
    fn test_whitespace_and_tags() {
        let cleaner = PassageCleaner::default();
        let text = kept(cleaner.clean("  Астана   <b>қаласы</b>\n\tелорда  болып табылады "));
        assert_eq!(text, "Астана қаласы елорда болып табылады");
    }

    #[test]
    fn test_too_short() {
        let cleaner = PassageCleaner::default();
        assert_eq!(cleaner.clean("қысқа мәтін"), CleanVerdict::TooShort);
        // Tags do not count toward length.
        assert_eq!(
            cleaner.clean("<div class=\"wrapper\">қала</div>"),
            CleanVerdict::TooShort
        );
    }

    #[test]
    fn test_long_passage_without_kazakh_letters() {
        let cleaner = PassageCleaner::default();
        let english = "This paragraph is written entirely in English and has no Kazakh letters.";
        assert_eq!(cleaner.clean(english), CleanVerdict::NoSpecialChars);

        // Short passages skip the language check.
        let short = "Astana is the capital city";
        assert_eq!(kept(cleaner.clean(short)), short);
    }

    #[test]
    fn test_truncation_on_char_boundary() {
        let cleaner = PassageCleaner::default();
        let long = "қ".repeat(1500);
        match cleaner.clean(&long) {
            CleanVerdict::Kept { text, truncated } => {
                assert!(truncated);
                assert_eq!(text.chars().count(), 1000);
            }
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_report_counts() {
        let cleaner = PassageCleaner::default();
        let mut report = CleanReport::default();
        let long = "ә".repeat(1200);
        for raw in ["қысқа", long.as_str(), "Қазақстан - тәуелсіз мемлекет"] {
            report.record(&cleaner.clean(raw));
        }
        report.record_duplicate();

        assert_eq!(report.input, 3);
        assert_eq!(report.too_short, 1);
        assert_eq!(report.truncated, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(report.duplicates, 1);
    }
}
