//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias using QazError.
pub type Result<T> = std::result::Result<T, QazError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum QazError {
    /// No usable passages survived cleaning.
    #[error("Empty corpus: {message}")]
    EmptyCorpus { message: String },

    /// Query could not be interpreted.
    ///
    /// Retrieval degrades blank queries to empty results instead of raising
    /// this; it exists for callers that validate queries up front.
    #[error("Invalid query: {message}")]
    InvalidQuery { message: String },

    /// Lexical scoring failed.
    #[error("Scoring error: {message}")]
    Scoring { message: String },

    /// Reranking model failed to load or infer.
    #[error("Rerank inference error: {message}")]
    RerankInference { message: String },

    /// Reranking did not finish before its deadline.
    #[error("Rerank timed out after {elapsed_ms}ms")]
    RerankTimeout { elapsed_ms: u64 },

    /// A new corpus snapshot could not be built.
    #[error("Index build error: {message}")]
    IndexBuild { message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Embedding provider error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Vector search provider error.
    #[error("Vector search error: {message}")]
    VectorSearch { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QazError {
    /// Create an empty corpus error.
    pub fn empty_corpus(message: impl Into<String>) -> Self {
        Self::EmptyCorpus {
            message: message.into(),
        }
    }

    /// Create a scoring error.
    pub fn scoring(message: impl Into<String>) -> Self {
        Self::Scoring {
            message: message.into(),
        }
    }

    /// Create a rerank inference error.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::RerankInference {
            message: message.into(),
        }
    }

    /// Create an index build error.
    pub fn index_build(message: impl Into<String>) -> Self {
        Self::IndexBuild {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a vector search error.
    pub fn vector_search(message: impl Into<String>) -> Self {
        Self::VectorSearch {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error is fatal for a snapshot build.
    pub fn is_build_failure(&self) -> bool {
        matches!(self, Self::EmptyCorpus { .. } | Self::IndexBuild { .. })
    }

    /// Stable error code for logs and outer API layers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyCorpus { .. } => "EMPTY_CORPUS",
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::Scoring { .. } => "SCORING_ERROR",
            Self::RerankInference { .. } => "RERANK_INFERENCE_ERROR",
            Self::RerankTimeout { .. } => "RERANK_TIMEOUT",
            Self::IndexBuild { .. } => "INDEX_BUILD_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::VectorSearch { .. } => "VECTOR_SEARCH_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QazError::empty_corpus("0 of 12 passages survived cleaning");
        assert!(err.to_string().contains("0 of 12"));

        let err = QazError::RerankTimeout { elapsed_ms: 250 };
        assert_eq!(err.to_string(), "Rerank timed out after 250ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(QazError::scoring("nan").error_code(), "SCORING_ERROR");
        assert_eq!(
            QazError::rerank("model missing").error_code(),
            "RERANK_INFERENCE_ERROR"
        );
        assert_eq!(
            QazError::index_build("boom").error_code(),
            "INDEX_BUILD_ERROR"
        );
    }

    #[test]
    fn test_build_failures() {
        assert!(QazError::empty_corpus("x").is_build_failure());
        assert!(QazError::index_build("x").is_build_failure());
        assert!(!QazError::scoring("x").is_build_failure());
    }
}
