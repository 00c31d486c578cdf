use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::{ModelWeights, MAX_SEQ_LEN};
use tokenizers::Tokenizer;

use super::backend::GenerationBackend;
use super::device::select_device;
use super::types::{GenerationConfig, ModelError};

/// Tokens that end a generation, whichever the tokenizer vocabulary knows
const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|im_end|>", "<|eot_id|>"];

/// Configuration for Candle backend
#[derive(Debug, Clone)]
pub struct CandleConfig {
    /// Path to the GGUF model file
    pub model_path: PathBuf,
    /// Sampling parameters and token budget
    pub generation: GenerationConfig,
    /// Explicit device preference (cpu, cuda, metal); auto-detect when `None`
    pub device: Option<String>,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model.gguf"),
            generation: GenerationConfig::default(),
            device: None,
        }
    }
}

impl CandleConfig {
    /// Resolve a model identifier against the weights cache directory
    ///
    /// An identifier naming an existing file is used as-is. Otherwise it is
    /// treated as a directory under `cache_dir` holding a `.gguf` file
    /// (preferring `model.gguf`) next to `tokenizer.json`.
    pub fn resolve(model_id: &str, cache_dir: &Path) -> Result<PathBuf, ModelError> {
        let direct = PathBuf::from(model_id);
        if direct.is_file() {
            return Ok(direct);
        }

        let model_dir = cache_dir.join(model_id);
        let preferred = model_dir.join("model.gguf");
        if preferred.is_file() {
            return Ok(preferred);
        }

        let entries = std::fs::read_dir(&model_dir).map_err(|e| {
            ModelError::LoadError(format!(
                "Model '{}' not found (looked for {:?}): {}",
                model_id, model_dir, e
            ))
        })?;

        let mut candidates: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "gguf"))
            .collect();
        candidates.sort();

        candidates.into_iter().next().ok_or_else(|| {
            ModelError::LoadError(format!(
                "Model '{}' not found: no .gguf file in {:?}",
                model_id, model_dir
            ))
        })
    }

    /// Get tokenizer path (assumes tokenizer.json in same directory as model)
    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("tokenizer.json")
    }
}

/// Candle-based model backend for local LLM inference
pub struct CandleBackend {
    model: Mutex<ModelWeights>,
    tokenizer: Tokenizer,
    device: Device,
    eos_tokens: Vec<u32>,
    model_name: String,
    config: CandleConfig,
}

impl CandleBackend {
    /// Load weights and tokenizer. Expensive; call once per process.
    pub fn load(mut config: CandleConfig) -> Result<Self, ModelError> {
        config.generation.context_window =
            supported_context_window(config.generation.context_window);

        let device = select_device(config.device.as_deref())?;
        log::info!("loading {:?} on {:?}", config.model_path, device);

        let model = load_weights(&config.model_path, &device)?;
        let tokenizer = load_tokenizer(&config.tokenizer_path())?;

        let eos_tokens: Vec<u32> = EOS_CANDIDATES
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if eos_tokens.is_empty() {
            log::warn!("no end-of-sequence token in vocabulary; generation stops at max_new_tokens");
        }

        let model_name = config
            .model_path
            .file_stem()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            model: Mutex::new(model),
            tokenizer,
            device,
            eos_tokens,
            model_name,
            config,
        })
    }

    /// Sample continuation tokens for an already tokenized prompt
    fn generate_tokens(&self, prompt_tokens: &[u32]) -> Result<Vec<u32>, ModelError> {
        let generation = &self.config.generation;
        let temperature = (generation.temperature > 0.0).then_some(generation.temperature);
        let mut logits_processor =
            LogitsProcessor::new(generation.sampling_seed(), temperature, Some(generation.top_p));

        let mut model = self.model.lock().map_err(|e| {
            ModelError::InferenceError(format!("Failed to lock model mutex: {}", e))
        })?;

        let mut all_tokens = prompt_tokens.to_vec();
        let mut generated_tokens = Vec::new();

        // Index 0 resets the KV cache left over from the previous call
        let input = Tensor::new(prompt_tokens, &self.device)?.unsqueeze(0)?;
        let logits = model.forward(&input, 0)?;
        let mut next_token = logits_processor.sample(&self.last_logits(logits, &all_tokens)?)?;

        for index in 0..generation.max_new_tokens {
            if self.eos_tokens.contains(&next_token) {
                break;
            }

            all_tokens.push(next_token);
            generated_tokens.push(next_token);

            if index + 1 == generation.max_new_tokens {
                break;
            }

            let input = Tensor::new(&[next_token], &self.device)?.unsqueeze(0)?;
            let logits = model.forward(&input, prompt_tokens.len() + index)?;
            next_token = logits_processor.sample(&self.last_logits(logits, &all_tokens)?)?;
        }

        Ok(generated_tokens)
    }

    fn last_logits(&self, logits: Tensor, context: &[u32]) -> Result<Tensor, ModelError> {
        let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
        let penalty = self.config.generation.repeat_penalty;

        if (penalty - 1.0).abs() < f32::EPSILON {
            return Ok(logits);
        }

        let start = context
            .len()
            .saturating_sub(self.config.generation.repeat_last_n);
        Ok(candle_transformers::utils::apply_repeat_penalty(
            &logits,
            penalty,
            &context[start..],
        )?)
    }
}

/// Rotary tables of the quantized llama runtime stop at `MAX_SEQ_LEN`
fn supported_context_window(requested: usize) -> usize {
    if requested > MAX_SEQ_LEN {
        log::warn!(
            "context window {} exceeds the {} positions this runtime supports; using {}",
            requested,
            MAX_SEQ_LEN,
            MAX_SEQ_LEN
        );
        MAX_SEQ_LEN
    } else {
        requested
    }
}

fn load_weights(path: &Path, device: &Device) -> Result<ModelWeights, ModelError> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| ModelError::LoadError(format!("cannot open model {:?}: {}", path, e)))?;

    let content = gguf_file::Content::read(&mut file)
        .map_err(|e| ModelError::LoadError(format!("{:?} is not a GGUF model: {}", path, e)))?;

    ModelWeights::from_gguf(content, &mut file, device).map_err(|e| {
        ModelError::LoadError(format!(
            "cannot load weights from {:?} (a llama-family GGUF is required): {}",
            path, e
        ))
    })
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer, ModelError> {
    if !path.is_file() {
        return Err(ModelError::LoadError(format!(
            "tokenizer.json missing at {:?}; it must sit next to the model file",
            path
        )));
    }

    Tokenizer::from_file(path)
        .map_err(|e| ModelError::LoadError(format!("cannot load tokenizer {:?}: {}", path, e)))
}

impl GenerationBackend for CandleBackend {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let start = Instant::now();

        let encoding = self.tokenizer.encode(prompt, true)?;
        let prompt_tokens = encoding.get_ids();
        if prompt_tokens.is_empty() {
            return Err(ModelError::InferenceError(
                "prompt produced no tokens".to_string(),
            ));
        }

        self.config.generation.check_budget(prompt_tokens.len())?;

        let output_tokens = self.generate_tokens(prompt_tokens)?;
        let response = self.tokenizer.decode(&output_tokens, true)?;

        log::debug!(
            "candle generated {} token(s) for a {}-token prompt in {} ms",
            output_tokens.len(),
            prompt_tokens.len(),
            start.elapsed().as_millis()
        );

        Ok(response)
    }

    fn backend_type(&self) -> &'static str {
        "candle"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn health_check(&self) -> Result<(), ModelError> {
        self.tokenizer
            .encode("test", true)
            .map_err(|e| ModelError::HealthCheckError(format!("Tokenizer test failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenizer_path_next_to_model() {
        let config = CandleConfig {
            model_path: PathBuf::from("/models/lfm2/model.gguf"),
            ..Default::default()
        };

        assert_eq!(
            config.tokenizer_path(),
            PathBuf::from("/models/lfm2/tokenizer.json")
        );
    }

    #[test]
    fn test_resolve_prefers_model_gguf_in_cache_dir() {
        let cache = tempfile::tempdir().unwrap();
        let model_dir = cache.path().join("LiquidAI/LFM2-1.2B");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("a-q4.gguf"), b"").unwrap();
        std::fs::write(model_dir.join("model.gguf"), b"").unwrap();

        let resolved = CandleConfig::resolve("LiquidAI/LFM2-1.2B", cache.path()).unwrap();
        assert_eq!(resolved, model_dir.join("model.gguf"));
    }

    #[test]
    fn test_resolve_falls_back_to_any_gguf() {
        let cache = tempfile::tempdir().unwrap();
        let model_dir = cache.path().join("tiny");
        std::fs::create_dir_all(&model_dir).unwrap();
        std::fs::write(model_dir.join("tiny-q8_0.gguf"), b"").unwrap();
        std::fs::write(model_dir.join("tokenizer.json"), b"{}").unwrap();

        let resolved = CandleConfig::resolve("tiny", cache.path()).unwrap();
        assert_eq!(resolved, model_dir.join("tiny-q8_0.gguf"));
    }

    #[test]
    fn test_resolve_missing_model_is_load_error() {
        let cache = tempfile::tempdir().unwrap();
        let result = CandleConfig::resolve("does/not-exist", cache.path());
        assert!(matches!(result, Err(ModelError::LoadError(_))));
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let config = CandleConfig {
            model_path: PathBuf::from("/nonexistent/model.gguf"),
            device: Some("cpu".to_string()),
            ..Default::default()
        };

        let result = CandleBackend::load(config);
        assert!(matches!(result, Err(ModelError::LoadError(_))));
    }

    #[test]
    fn context_window_is_clamped_to_runtime_limit() {
        assert_eq!(supported_context_window(65536), MAX_SEQ_LEN);
        assert_eq!(supported_context_window(2048), 2048);
        assert_eq!(supported_context_window(MAX_SEQ_LEN), MAX_SEQ_LEN);
    }

    #[test]
    fn clamped_window_turns_long_prompts_into_overflow() {
        let generation = GenerationConfig {
            context_window: supported_context_window(GenerationConfig::default().context_window),
            ..GenerationConfig::default()
        };

        assert!(matches!(
            generation.check_budget(5000),
            Err(ModelError::ContextOverflow {
                context_window: MAX_SEQ_LEN,
                ..
            })
        ));
    }
}
