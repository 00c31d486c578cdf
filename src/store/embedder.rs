//! Sentence embeddings for the recipe store.

use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config, DTYPE};
use tokenizers::{Tokenizer, TruncationParams};

use crate::llm::{select_device, ModelError};

/// Represents an embedding vector
pub type Embedding = Vec<f32>;

/// Trait for embedding models
pub trait Embedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Embedding, ModelError>;

    /// Embed multiple texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ModelError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// L2-normalize in place; the zero vector is left as is
pub fn normalize_embedding(embedding: &mut [f32]) {
    let norm = embedding.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in embedding.iter_mut() {
            *value /= norm;
        }
    }
}

/// Configuration for the BERT embedder
#[derive(Debug, Clone)]
pub struct BertEmbedderConfig {
    /// Directory holding config.json, tokenizer.json and model.safetensors
    pub model_dir: PathBuf,
    /// Name recorded in the persisted index
    pub model_name: String,
    /// Maximum sequence length
    pub max_length: usize,
    /// Explicit device preference; auto-detect when `None`
    pub device: Option<String>,
}

impl BertEmbedderConfig {
    /// Resolve a model identifier to a directory under the weights cache
    pub fn resolve(model_id: &str, cache_dir: &Path) -> Self {
        let direct = PathBuf::from(model_id);
        let model_dir = if direct.is_dir() {
            direct
        } else {
            cache_dir.join(model_id)
        };

        Self {
            model_dir,
            model_name: model_id.to_string(),
            max_length: 512,
            device: None,
        }
    }
}

/// Candle BERT encoder with mean pooling and L2 normalization
pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
    model_name: String,
}

impl BertEmbedder {
    pub fn load(config: BertEmbedderConfig) -> Result<Self, ModelError> {
        let device = select_device(config.device.as_deref())?;
        let config_path = config.model_dir.join("config.json");
        let tokenizer_path = config.model_dir.join("tokenizer.json");
        let weights_path = config.model_dir.join("model.safetensors");

        log::info!(
            "Loading embedder {} from {:?} on {:?}",
            config.model_name,
            config.model_dir,
            device
        );

        for path in [&config_path, &tokenizer_path, &weights_path] {
            if !path.exists() {
                return Err(ModelError::LoadError(format!(
                    "Embedding model file not found: {:?}",
                    path
                )));
            }
        }

        let raw_config = std::fs::read_to_string(&config_path)?;
        let bert_config: Config = serde_json::from_str(&raw_config).map_err(|e| {
            ModelError::LoadError(format!("Invalid embedder config {:?}: {}", config_path, e))
        })?;
        let dimension = serde_json::from_str::<serde_json::Value>(&raw_config)
            .ok()
            .and_then(|value| value.get("hidden_size").and_then(|size| size.as_u64()))
            .ok_or_else(|| {
                ModelError::LoadError(format!("{:?} has no hidden_size", config_path))
            })? as usize;

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            ModelError::LoadError(format!(
                "Failed to load tokenizer from {:?}: {}",
                tokenizer_path, e
            ))
        })?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: config.max_length,
                ..Default::default()
            }))
            .map_err(|e| ModelError::LoadError(format!("Invalid truncation: {}", e)))?;

        // SAFETY: the weights file is not modified while mapped
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DTYPE, &device) }
            .map_err(|e| ModelError::LoadError(format!("Failed to map weights: {}", e)))?;
        let model = BertModel::load(vb, &bert_config)
            .map_err(|e| ModelError::LoadError(format!("Failed to build BERT: {}", e)))?;

        log::info!("Embedder loaded (dim={})", dimension);

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
            model_name: config.model_name,
        })
    }
}

impl Embedder for BertEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, ModelError> {
        let encoding = self.tokenizer.encode(text, true)?;
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = input_ids.zeros_like()?;

        let hidden = self.model.forward(&input_ids, &token_type_ids, None)?;
        let (_batch, n_tokens, _hidden) = hidden.dims3()?;
        let pooled = (hidden.sum(1)? / n_tokens as f64)?;

        let mut embedding = pooled.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        normalize_embedding(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
