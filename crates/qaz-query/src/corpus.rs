//! Corpus sources.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use qaz_core::{CorpusSource, Passage, PassageId, Result};

/// Reads passages from a JSON Lines file.
///
/// Each line is either a passage object (`{"id": .., "text": ..}`) or a QA
/// record whose `positive_passages` and `negative_passages` arrays hold
/// passage objects. Passages without an id get `"<line>:<n>"`. Lines that
/// parse as neither are skipped.
#[derive(Debug, Clone)]
pub struct JsonlCorpus {
    path: PathBuf,
}

impl JsonlCorpus {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Deserialize)]
struct RawPassage {
    #[serde(default, alias = "docid")]
    id: Option<PassageId>,
    text: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    created_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawRecord {
    Passage(RawPassage),
    Qa {
        positive_passages: Option<Vec<RawPassage>>,
        negative_passages: Option<Vec<RawPassage>>,
    },
}

impl RawPassage {
    fn into_passage(self, fallback_id: PassageId) -> Passage {
        let mut passage = Passage::new(self.id.unwrap_or(fallback_id), self.text);
        passage.metadata = self.metadata;
        passage.created_at = self.created_at;
        if let Some(category) = self.category {
            passage
                .metadata
                .insert("category".to_string(), serde_json::Value::String(category));
        }
        if let Some(title) = self.title {
            passage
                .metadata
                .insert("title".to_string(), serde_json::Value::String(title));
        }
        passage
    }
}

impl CorpusSource for JsonlCorpus {
    fn load(&self) -> Result<Vec<Passage>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut passages = Vec::new();
        let mut skipped = 0usize;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let record: RawRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping line {} of {:?}: {}", line_no, self.path, e);
                    skipped += 1;
                    continue;
                }
            };

            let raw = match record {
                RawRecord::Passage(passage) => vec![passage],
                RawRecord::Qa {
                    positive_passages: None,
                    negative_passages: None,
                } => {
                    warn!(
                        "Skipping line {} of {:?}: neither a passage nor a QA record",
                        line_no, self.path
                    );
                    skipped += 1;
                    continue;
                }
                RawRecord::Qa {
                    positive_passages,
                    negative_passages,
                } => positive_passages
                    .into_iter()
                    .flatten()
                    .chain(negative_passages.into_iter().flatten())
                    .collect(),
            };

            for (n, passage) in raw.into_iter().enumerate() {
                let fallback = PassageId::Key(format!("{}:{}", line_no, n));
                passages.push(passage.into_passage(fallback));
            }
        }

        info!(
            "Loaded {} raw passages from {:?} ({} lines skipped)",
            passages.len(),
            self.path,
            skipped
        );
        Ok(passages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_lines(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[test]
    fn test_passage_lines() {
        let file = write_lines(&[
            r#"{"id": 7, "text": "Астана - елорда", "category": "geo"}"#,
            r#"{"id": "kz-2", "text": "Алматы", "created_at": 1700000000000}"#,
            r#"{"text": "id жоқ мәтін"}"#,
        ]);

        let passages = JsonlCorpus::new(file.path()).load().unwrap();
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[0].id, PassageId::Num(7));
        assert_eq!(passages[0].category(), Some("geo"));
        assert_eq!(passages[1].id, PassageId::Key("kz-2".to_string()));
        assert_eq!(passages[1].created_at, Some(1_700_000_000_000));
        assert_eq!(passages[2].id, PassageId::Key("3:0".to_string()));
    }

    #[test]
    fn test_qa_records() {
        let file = write_lines(&[
            r#"{"query": "астана", "positive_passages": [{"docid": "p1", "title": "Астана", "text": "оң"}], "negative_passages": [{"text": "теріс"}]}"#,
        ]);

        let passages = JsonlCorpus::new(file.path()).load().unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].id, PassageId::Key("p1".to_string()));
        assert_eq!(passages[0].text, "оң");
        assert_eq!(passages[0].metadata["title"], "Астана");
        assert_eq!(passages[1].id, PassageId::Key("1:1".to_string()));
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let file = write_lines(&["not json", "", r#"{"id": 1, "text": "жарамды"}"#, "[1, 2]"]);
        let passages = JsonlCorpus::new(file.path()).load().unwrap();
        assert_eq!(passages.len(), 1);
    }

    #[test]
    fn test_records_without_text_skipped() {
        let file = write_lines(&[
            r#"{"id": 1, "body": "мәтін жоқ"}"#,
            "{}",
            r#"{"query": "бос", "positive_passages": []}"#,
            r#"{"id": 2, "text": "жарамды"}"#,
        ]);
        let passages = JsonlCorpus::new(file.path()).load().unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].id, PassageId::Num(2));
    }

    #[test]
    fn test_missing_file() {
        let err = JsonlCorpus::new("/nonexistent/corpus.jsonl").load().unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
