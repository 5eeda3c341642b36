//! Core domain types for the retrieval engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

/// Stable passage identifier, unique within a corpus snapshot.
///
/// Corpus sources use either integer ids or opaque string keys; both
/// serialize as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PassageId {
    Num(u64),
    Key(String),
}

impl From<u64> for PassageId {
    fn from(id: u64) -> Self {
        Self::Num(id)
    }
}

impl From<&str> for PassageId {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PassageId {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl std::fmt::Display for PassageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Key(k) => write!(f, "{}", k),
        }
    }
}

/// An immutable unit of retrievable text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    /// Stable identifier.
    pub id: PassageId,

    /// Passage text (cleaned once it is inside a snapshot).
    pub text: String,

    /// Optional category and other key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Creation timestamp (Unix millis).
    #[serde(default)]
    pub created_at: Option<u64>,

    /// Blake3 hash of the cleaned text, set by the corpus index.
    #[serde(default, with = "serde_bytes_opt")]
    pub content_hash: Option<[u8; 32]>,
}

impl Passage {
    /// Create a passage with no metadata.
    pub fn new(id: impl Into<PassageId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: HashMap::new(),
            created_at: None,
            content_hash: None,
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Set the creation timestamp.
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Category, if the source supplied one.
    pub fn category(&self) -> Option<&str> {
        self.metadata.get("category").and_then(|v| v.as_str())
    }
}

/// Hash text content for deduplication.
pub fn content_hash(text: &str) -> [u8; 32] {
    *blake3::hash(text.as_bytes()).as_bytes()
}

/// Identifier of a corpus snapshot generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub Ulid);

impl SnapshotId {
    /// Allocate a fresh snapshot id.
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lexically retrieved passage.
///
/// Produced fresh per query. Fusion and reranking build new records rather
/// than mutating existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Passage identifier.
    pub passage_id: PassageId,

    /// Passage text.
    pub text: String,

    /// BM25 score (0 when the passage only came from vector search).
    pub lexical_score: f64,

    /// Cosine-style similarity from the vector search provider.
    pub vector_score: Option<f64>,

    /// Leading tokens of the passage, for observability.
    pub tokens_sample: Vec<String>,
}

impl RetrievalResult {
    /// Copy of this result carrying a vector similarity.
    pub fn with_vector_score(&self, vector_score: f64) -> Self {
        Self {
            vector_score: Some(vector_score),
            ..self.clone()
        }
    }
}

/// A fused lexical + vector candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub result: RetrievalResult,
    pub combined_score: f64,
}

/// A reranked result; `rerank_score` is the final ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub result: RetrievalResult,
    pub rerank_score: f64,
}

/// One hit returned by the external vector search provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub passage_id: PassageId,

    /// Cosine-style similarity in [-1, 1].
    pub vector_similarity: f64,

    pub text: String,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Helper module for optional byte array serialization.
mod serde_bytes_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => {
                let hex = hex::encode(bytes);
                hex.serialize(serializer)
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        match opt {
            Some(hex) => {
                let bytes = hex::decode(&hex).map_err(serde::de::Error::custom)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| serde::de::Error::custom("invalid hash length"))?;
                Ok(Some(arr))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passage_id_serde_untagged() {
        let num: PassageId = serde_json::from_str("42").unwrap();
        assert_eq!(num, PassageId::Num(42));

        let key: PassageId = serde_json::from_str("\"kz-001\"").unwrap();
        assert_eq!(key, PassageId::Key("kz-001".to_string()));
        assert_eq!(key.to_string(), "kz-001");
    }

    #[test]
    fn test_passage_hash_roundtrip() {
        let mut passage = Passage::new(7u64, "Астана - Қазақстанның елордасы")
            .with_metadata("category", serde_json::json!("geo"));
        passage.content_hash = Some(content_hash(&passage.text));

        let json = serde_json::to_string(&passage).unwrap();
        let back: Passage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content_hash, passage.content_hash);
        assert_eq!(back.category(), Some("geo"));
    }

    #[test]
    fn test_passage_defaults_when_missing() {
        let passage: Passage = serde_json::from_str(r#"{"id": 1, "text": "мәтін"}"#).unwrap();
        assert!(passage.metadata.is_empty());
        assert!(passage.created_at.is_none());
        assert!(passage.content_hash.is_none());
    }

    #[test]
    fn test_with_vector_score_is_a_copy() {
        let original = RetrievalResult {
            passage_id: PassageId::Num(1),
            text: "text".to_string(),
            lexical_score: 1.5,
            vector_score: None,
            tokens_sample: vec![],
        };
        let scored = original.with_vector_score(0.25);
        assert_eq!(original.vector_score, None);
        assert_eq!(scored.vector_score, Some(0.25));
        assert_eq!(scored.lexical_score, 1.5);
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(content_hash("қала"), content_hash("қала"));
        assert_ne!(content_hash("қала"), content_hash("қалалар"));
    }
}
