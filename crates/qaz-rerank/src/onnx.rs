//! ONNX Runtime model adapters.
//!
//! Both adapters load `model.onnx` and `tokenizer.json` from one model
//! directory. Inference is CPU-bound and runs on tokio's blocking pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayD;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{EncodeInput, Tokenizer, TruncationParams};
use tracing::{debug, info};

use qaz_core::{CrossEncoder, Embedder, QazError, RerankConfig, Result};

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// LaBSE-style sentence encoders emit 768-dimensional vectors.
const DEFAULT_DIMENSION: usize = 768;

/// Maps a message to the error variant of the owning adapter.
type ErrorKind = fn(String) -> QazError;

/// Raw model output plus the padded attention mask it was computed with.
struct ModelOutput {
    values: ArrayD<f32>,
    attention_mask: Vec<i64>,
    seq_len: usize,
}

/// An ONNX session together with its tokenizer.
struct OnnxModel {
    /// Inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer with truncation to `max_length` enabled.
    tokenizer: Tokenizer,

    max_length: usize,

    error: ErrorKind,
}

impl OnnxModel {
    fn load(dir: &Path, config: &RerankConfig, error: ErrorKind) -> Result<Self> {
        let model_path = dir.join(MODEL_FILE);
        let tokenizer_path = dir.join(TOKENIZER_FILE);

        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()
            .map_err(|e| error(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| error(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(config.num_threads)
            .map_err(|e| error(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| error(format!("Failed to load model {:?}: {}", model_path, e)))?;

        info!("Loading tokenizer from {:?}", tokenizer_path);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| error(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| error(format!("Failed to configure truncation: {}", e)))?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length: config.max_length,
            error,
        })
    }

    /// Tokenize one batch, pad it and run a single inference call.
    fn infer<'s, E>(&self, inputs: Vec<E>) -> Result<ModelOutput>
    where
        E: Into<EncodeInput<'s>> + Send,
    {
        let error = self.error;

        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| error(format!("Tokenization failed: {}", e)))?;

        let batch_size = encodings.len();
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_length);

        debug!("Inference batch: size={}, seq_len={}", batch_size, seq_len);

        let mut input_ids = vec![0i64; batch_size * seq_len];
        let mut attention_mask = vec![0i64; batch_size * seq_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for j in 0..ids.len().min(seq_len) {
                input_ids[i * seq_len + j] = ids[j] as i64;
                attention_mask[i * seq_len + j] = mask[j] as i64;
            }
        }

        let input_ids_tensor = Tensor::from_array((vec![batch_size, seq_len], input_ids))
            .map_err(|e| error(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, seq_len], attention_mask.clone()))
                .map_err(|e| error(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| error(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| error(format!("Inference failed: {}", e)))?;

        // Models name their outputs differently; the first one is the logits
        // or the hidden states.
        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| error("No output tensor found".to_string()))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| error(format!("Failed to extract tensor: {}", e)))?;

        debug!("Output shape: {:?}", view.shape());

        Ok(ModelOutput {
            values: view.to_owned(),
            attention_mask,
            seq_len,
        })
    }
}

/// Sequence-classification reranker (e.g. a fine-tuned Kazakh RoBERTa).
pub struct OnnxCrossEncoder {
    model: Arc<OnnxModel>,
}

impl OnnxCrossEncoder {
    /// Load a cross-encoder from a model directory.
    pub fn from_dir(dir: impl AsRef<Path>, config: &RerankConfig) -> Result<Self> {
        let model = OnnxModel::load(dir.as_ref(), config, QazError::rerank)?;
        info!("Cross-encoder initialized: max_length={}", model.max_length);
        Ok(Self {
            model: Arc::new(model),
        })
    }

    fn score_blocking(model: &OnnxModel, pairs: Vec<(String, String)>) -> Result<Vec<f32>> {
        let batch_size = pairs.len();
        let output = model.infer(pairs)?;
        let logits = &output.values;

        // One relevance logit per pair: [batch, 1] or already squeezed to [batch].
        match logits.shape() {
            [n, _] if *n == batch_size => Ok((0..batch_size).map(|i| logits[[i, 0]]).collect()),
            [n] if *n == batch_size => Ok((0..batch_size).map(|i| logits[[i]]).collect()),
            shape => Err(QazError::rerank(format!(
                "Unexpected logits shape {:?} for {} pairs",
                shape, batch_size
            ))),
        }
    }
}

#[async_trait]
impl CrossEncoder for OnnxCrossEncoder {
    async fn score_pairs(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(String, String)> = passages
            .iter()
            .map(|p| (query.to_string(), p.to_string()))
            .collect();
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || Self::score_blocking(&model, pairs))
            .await
            .map_err(|e| QazError::rerank(format!("Inference task failed: {}", e)))?
    }

    fn max_length(&self) -> usize {
        self.model.max_length
    }
}

/// Sentence encoder producing mean-pooled, L2-normalized embeddings.
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
    dimension: usize,
    query_prefix: String,
    passage_prefix: String,
}

impl OnnxEmbedder {
    /// Load an embedder from a model directory.
    pub fn from_dir(dir: impl AsRef<Path>, config: &RerankConfig) -> Result<Self> {
        let model = OnnxModel::load(dir.as_ref(), config, QazError::embedding)?;
        info!(
            "Embedder initialized: dim={}, max_length={}",
            DEFAULT_DIMENSION, model.max_length
        );
        Ok(Self {
            model: Arc::new(model),
            dimension: DEFAULT_DIMENSION,
            query_prefix: String::new(),
            passage_prefix: String::new(),
        })
    }

    /// Override the reported embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Prefixes for asymmetric encoders (e.g. `"query: "` / `"passage: "`).
    pub fn with_prefixes(mut self, query: impl Into<String>, passage: impl Into<String>) -> Self {
        self.query_prefix = query.into();
        self.passage_prefix = passage.into();
        self
    }

    async fn embed(&self, texts: &[&str], prefix: &str) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts.iter().map(|t| format!("{}{}", prefix, t)).collect();
        let model = Arc::clone(&self.model);

        tokio::task::spawn_blocking(move || Self::embed_blocking(&model, prefixed))
            .await
            .map_err(|e| QazError::embedding(format!("Inference task failed: {}", e)))?
    }

    fn embed_blocking(model: &OnnxModel, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let batch_size = texts.len();
        let output = model.infer(texts)?;
        let values = &output.values;

        match *values.shape() {
            // [batch, seq, hidden]: mean pooling over unmasked tokens
            [n, seq, hidden] if n == batch_size => Ok((0..batch_size)
                .map(|i| {
                    let mask = &output.attention_mask[i * output.seq_len..(i + 1) * output.seq_len];
                    let mut sum = vec![0.0f32; hidden];
                    let mut valid = 0usize;
                    for (j, &m) in mask.iter().enumerate().take(seq) {
                        if m == 1 {
                            valid += 1;
                            for (k, s) in sum.iter_mut().enumerate() {
                                *s += values[[i, j, k]];
                            }
                        }
                    }
                    if valid == 0 {
                        return sum;
                    }
                    l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
                })
                .collect()),
            // [batch, hidden]: already pooled
            [n, hidden] if n == batch_size => Ok((0..batch_size)
                .map(|i| l2_normalize((0..hidden).map(|k| values[[i, k]]).collect()))
                .collect()),
            _ => Err(QazError::embedding(format!(
                "Unexpected output shape: {:?}",
                values.shape()
            ))),
        }
    }
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, &self.passage_prefix).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text], &self.query_prefix)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| QazError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_missing_model_dir_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let err = OnnxCrossEncoder::from_dir(dir.path(), &RerankConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "RERANK_INFERENCE_ERROR");

        let err = OnnxEmbedder::from_dir(dir.path(), &RerankConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "EMBEDDING_ERROR");
    }
}
