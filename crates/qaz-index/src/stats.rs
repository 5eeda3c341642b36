//! Descriptive statistics over a snapshot.

use serde::{Deserialize, Serialize};

use qaz_text::CleanReport;

use crate::snapshot::CorpusSnapshot;

/// Passage length distribution, in characters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LengthStats {
    pub min: usize,
    pub max: usize,
    pub avg: f64,
    pub median: usize,
}

/// Token count distribution per passage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub min: usize,
    pub max: usize,
    pub avg: f64,
    pub total: usize,
}

/// Summary of a corpus snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub snapshot_id: String,
    pub total_passages: usize,
    pub unique_tokens: usize,
    pub passage_lengths: LengthStats,
    pub token_counts: TokenStats,
    pub cleaning: CleanReport,
}

impl CorpusStats {
    /// Collect statistics from `snapshot`.
    pub fn collect(snapshot: &CorpusSnapshot) -> Self {
        let mut lengths: Vec<usize> = snapshot
            .passages()
            .iter()
            .map(|p| p.text.chars().count())
            .collect();
        lengths.sort_unstable();

        let counts: Vec<usize> = (0..snapshot.len())
            .filter_map(|p| snapshot.tokens(p).map(<[String]>::len))
            .collect();

        Self {
            snapshot_id: snapshot.id().to_string(),
            total_passages: snapshot.len(),
            unique_tokens: snapshot.inverted_index().len(),
            passage_lengths: length_stats(&lengths),
            token_counts: token_stats(&counts),
            cleaning: snapshot.clean_report().clone(),
        }
    }
}

fn mean(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}

/// `sorted` must be in ascending order.
fn length_stats(sorted: &[usize]) -> LengthStats {
    if sorted.is_empty() {
        return LengthStats::default();
    }
    LengthStats {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        avg: mean(sorted),
        median: sorted[sorted.len() / 2],
    }
}

fn token_stats(counts: &[usize]) -> TokenStats {
    TokenStats {
        min: counts.iter().copied().min().unwrap_or(0),
        max: counts.iter().copied().max().unwrap_or(0),
        avg: mean(counts),
        total: counts.iter().sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CorpusIndex;
    use qaz_core::{IndexConfig, Passage};

    #[test]
    fn test_collect() {
        let snapshot = CorpusIndex::new(IndexConfig::default())
            .unwrap()
            .build(vec![
                Passage::new(0u64, "Astana is the capital city"),
                Passage::new(1u64, "Almaty is the largest city in the south"),
                Passage::new(2u64, "tiny"),
            ])
            .unwrap();

        let stats = CorpusStats::collect(&snapshot);
        assert_eq!(stats.total_passages, 2);
        assert_eq!(stats.passage_lengths.min, 26);
        assert_eq!(stats.passage_lengths.max, 39);
        assert_eq!(stats.passage_lengths.median, 39);
        assert_eq!(stats.token_counts.total, 5 + 8);
        assert_eq!(stats.token_counts.min, 5);
        assert_eq!(stats.cleaning.too_short, 1);
        assert!(stats.unique_tokens >= 9);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["total_passages"], 2);
    }

    #[test]
    fn test_length_stats_empty() {
        assert_eq!(length_stats(&[]), LengthStats::default());
        assert_eq!(token_stats(&[]).avg, 0.0);
    }
}
