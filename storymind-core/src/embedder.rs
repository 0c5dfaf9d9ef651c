//! Sentence embedding model (C2).
//!
//! A single dense 384-dimensional, L2-normalized vector per input text,
//! produced by a BERT-family sentence-embedding model run through Candle.
//! Unlike the teacher's multi-vector XTR/ColBERT embedders (128-dim per
//! token, MaxSim scoring), this pipeline needs one pooled vector per window
//! for flat nearest-neighbor search, so pooling is mean-over-tokens rather
//! than CLS — the standard recipe for sentence-transformers models — instead
//! of the teacher's CLS-token pooling.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use hf_hub::api::sync::ApiBuilder;
use tokenizers::Tokenizer;

use crate::error::{Result, StoryMindError};

/// Output dimension of the sentence embedding model.
pub const EMBEDDING_DIM: usize = 384;

const MAX_SEQ_LEN: usize = 256;
const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// A text embedder producing a single normalized vector per input.
pub trait Embedder: Send {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Identifier recorded alongside a persisted index, so a reload can
    /// detect a model mismatch instead of silently scoring garbage.
    fn model_identity(&self) -> &str;
}

/// Candle-backed sentence embedder, loaded from the HuggingFace hub.
pub struct CandleEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
}

impl CandleEmbedder {
    /// Load the default sentence-embedding model.
    pub fn new(device: &Device) -> Result<Self> {
        Self::from_pretrained(DEFAULT_MODEL_ID, device)
    }

    pub fn from_pretrained(model_id: &str, device: &Device) -> Result<Self> {
        let api = ApiBuilder::new().with_progress(true).build().map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!(
                "failed to create HuggingFace API client: {e}"
            ))
        })?;
        let repo = api.model(model_id.to_string());

        tracing::info!("downloading sentence embedding model files from {}", model_id);
        let config_path = repo.get("config.json").map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!("failed to get config.json: {e}"))
        })?;
        let tokenizer_path = repo.get("tokenizer.json").map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!(
                "failed to get tokenizer.json: {e}"
            ))
        })?;
        let weights_path = repo.get("model.safetensors").map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!(
                "failed to get model.safetensors: {e}"
            ))
        })?;

        Self::from_files(&config_path, &tokenizer_path, &weights_path, model_id, device)
    }

    pub fn from_files(
        config_path: &Path,
        tokenizer_path: &Path,
        weights_path: &Path,
        model_id: &str,
        device: &Device,
    ) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path).map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!(
                "failed to read {}: {e}",
                config_path.display()
            ))
        })?;
        let config: BertConfig = serde_json::from_str(&config_str).map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!("failed to parse BERT config: {e}"))
        })?;

        let tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!("failed to load tokenizer: {e}"))
        })?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, device).map_err(
                |e| {
                    StoryMindError::EmbeddingModelUnavailable(format!(
                        "failed to load safetensors weights: {e}"
                    ))
                },
            )?
        };

        let model = BertModel::load(vb.clone(), &config)
            .or_else(|_| BertModel::load(vb.pp("bert"), &config))
            .map_err(|e| {
                StoryMindError::EmbeddingModelUnavailable(format!(
                    "failed to load BERT model: {e}"
                ))
            })?;

        Ok(Self {
            model,
            tokenizer,
            device: device.clone(),
            model_id: model_id.to_string(),
        })
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            StoryMindError::EmbeddingModelUnavailable(format!("tokenization failed: {e}"))
        })?;
        let mut ids: Vec<u32> = encoding.get_ids().to_vec();
        if ids.len() > MAX_SEQ_LEN {
            ids.truncate(MAX_SEQ_LEN);
        }
        Ok(ids)
    }
}

impl Embedder for CandleEmbedder {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>> {
        let tokens = self.tokenize(text)?;
        let seq_len = tokens.len();

        let input_ids = Tensor::new(&tokens[..], &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| StoryMindError::EmbeddingModelUnavailable(e.to_string()))?;
        let token_type_ids = Tensor::zeros((1, seq_len), DType::U32, &self.device)
            .map_err(|e| StoryMindError::EmbeddingModelUnavailable(e.to_string()))?;

        let hidden_states = self
            .model
            .forward(&input_ids, &token_type_ids, None)
            .map_err(|e| {
                StoryMindError::EmbeddingModelUnavailable(format!("forward pass failed: {e}"))
            })?;

        // hidden_states: [1, seq_len, dim]. Mean-pool over the sequence axis.
        let pooled = hidden_states
            .squeeze(0)
            .and_then(|h| h.mean(0))
            .map_err(|e| StoryMindError::EmbeddingModelUnavailable(e.to_string()))?;

        let normalized = l2_normalize_1d(&pooled)
            .map_err(|e| StoryMindError::EmbeddingModelUnavailable(e.to_string()))?;

        normalized
            .to_vec1::<f32>()
            .map_err(|e| StoryMindError::EmbeddingModelUnavailable(e.to_string()))
    }

    fn embedding_dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn model_identity(&self) -> &str {
        &self.model_id
    }
}

fn l2_normalize_1d(tensor: &Tensor) -> candle_core::Result<Tensor> {
    let norm = tensor.sqr()?.sum_all()?.sqrt()?.to_scalar::<f32>()?.max(1e-12);
    tensor / norm as f64
}

/// Euclidean (L2) distance between two equal-length vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}
