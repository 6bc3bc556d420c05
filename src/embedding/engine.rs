// Embedding Engine - local BERT-family encoder via Candle
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::path::{Path, PathBuf};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::embedding::{l2_normalize, Embedder, DEFAULT_MAX_LENGTH};
use crate::errors::{RecError, Result};

fn encoding_err(context: &str) -> impl Fn(candle_core::Error) -> RecError + '_ {
    move |e| RecError::Encoding(format!("{}: {}", context, e))
}

/// Embedding engine: CLS pooling over a BERT-style encoder, L2-normalised
pub struct EmbeddingEngine {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

/// Files making up an encoder checkpoint
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

impl EmbeddingEngine {
    /// Load an encoder from a local directory or a HuggingFace repo id
    ///
    /// A path that exists on disk must contain `config.json`,
    /// `tokenizer.json` and `model.safetensors`; anything else is treated
    /// as a hub repo id and downloaded on first use.
    pub fn load(model_path: &str, max_length: usize) -> Result<Self> {
        // CPU for now
        let device = Device::Cpu;
        let files = Self::resolve_files(model_path)?;

        let config_contents = std::fs::read_to_string(&files.config)?;
        let config: Config = serde_json::from_str(&config_contents)
            .map_err(|e| RecError::Encoding(format!("Failed to parse model config: {}", e)))?;
        let raw_config: serde_json::Value = serde_json::from_str(&config_contents)?;
        let dimension = raw_config
            .get("hidden_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| RecError::Encoding("Model config has no hidden_size".to_string()))?
            as usize;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| RecError::Encoding(format!("Failed to load tokenizer: {}", e)))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: if max_length == 0 { DEFAULT_MAX_LENGTH } else { max_length },
                ..Default::default()
            }))
            .map_err(|e| RecError::Encoding(format!("Failed to configure truncation: {}", e)))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], DType::F32, &device)
                .map_err(encoding_err("Failed to load model weights"))?
        };
        let model = BertModel::load(vb, &config).map_err(encoding_err("Failed to create model"))?;

        info!(model = model_path, dimension, "embedding model loaded");

        Ok(Self {
            model,
            tokenizer,
            device,
            dimension,
        })
    }

    fn resolve_files(model_path: &str) -> Result<ModelFiles> {
        let local = Path::new(model_path);
        if local.is_dir() {
            let files = ModelFiles {
                config: local.join("config.json"),
                tokenizer: local.join("tokenizer.json"),
                weights: local.join("model.safetensors"),
            };
            for path in [&files.config, &files.tokenizer, &files.weights] {
                if !path.exists() {
                    return Err(RecError::Encoding(format!(
                        "Model file missing: {}",
                        path.display()
                    )));
                }
            }
            return Ok(files);
        }

        debug!(repo = model_path, "fetching embedding model from hub");
        let hub_err = |e: hf_hub::api::sync::ApiError| {
            RecError::Encoding(format!("Failed to fetch {}: {}", model_path, e))
        };
        let api = Api::new().map_err(hub_err)?;
        let repo = api.repo(Repo::new(model_path.to_string(), RepoType::Model));

        Ok(ModelFiles {
            config: repo.get("config.json").map_err(hub_err)?,
            tokenizer: repo.get("tokenizer.json").map_err(hub_err)?,
            weights: repo.get("model.safetensors").map_err(hub_err)?,
        })
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RecError::Encoding(format!("Tokenization failed: {}", e)))?;

        let token_ids = Tensor::new(encoding.get_ids(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(encoding_err("Failed to build input tensor"))?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(encoding_err("Failed to build mask tensor"))?;
        let token_type_ids = token_ids
            .zeros_like()
            .map_err(encoding_err("Failed to build type tensor"))?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))
            .map_err(encoding_err("Forward pass failed"))?;

        // CLS token of the single batch row
        let cls = hidden
            .get(0)
            .and_then(|row| row.get(0))
            .and_then(|cls| cls.to_vec1::<f32>())
            .map_err(encoding_err("Failed to read CLS embedding"))?;

        Ok(cls)
    }
}

impl Embedder for EmbeddingEngine {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RecError::Encoding("Cannot embed empty text".to_string()));
        }

        let mut embedding = self.encode(text)?;
        l2_normalize(&mut embedding)?;
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
