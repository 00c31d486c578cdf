use thiserror::Error;

/// Sampling and budget parameters shared by every generation backend
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Temperature for sampling (0.0 = greedy, higher = more creative)
    pub temperature: f64,
    /// Top-p sampling parameter
    pub top_p: f64,
    /// Repetition penalty applied over the recent window
    pub repeat_penalty: f32,
    /// Number of trailing tokens the repetition penalty looks at
    pub repeat_last_n: usize,
    /// Maximum tokens to generate per call
    pub max_new_tokens: usize,
    /// Maximum combined prompt + continuation length in tokens
    pub context_window: usize,
    /// Fixed sampling seed; `None` draws a fresh seed per call
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.9,
            repeat_penalty: 1.1,
            repeat_last_n: 64,
            max_new_tokens: 1024,
            context_window: 65536,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Fail fast when a prompt cannot fit together with its continuation budget
    pub fn check_budget(&self, prompt_tokens: usize) -> Result<(), ModelError> {
        if prompt_tokens + self.max_new_tokens > self.context_window {
            return Err(ModelError::ContextOverflow {
                prompt_tokens,
                max_new_tokens: self.max_new_tokens,
                context_window: self.context_window,
            });
        }

        Ok(())
    }

    pub fn sampling_seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

/// Errors that can occur during model operations
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    LoadError(String),

    #[error(
        "Prompt of {prompt_tokens} tokens plus {max_new_tokens} new tokens exceeds the context window of {context_window}"
    )]
    ContextOverflow {
        prompt_tokens: usize,
        max_new_tokens: usize,
        context_window: usize,
    },

    #[error("Model inference failed: {0}")]
    InferenceError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Model health check failed: {0}")]
    HealthCheckError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Candle error: {0}")]
    CandleError(String),

    #[error("Tokenizer error: {0}")]
    TokenizerError(String),
}

// Implement From for Candle errors
impl From<candle_core::Error> for ModelError {
    fn from(err: candle_core::Error) -> Self {
        ModelError::CandleError(err.to_string())
    }
}

// Implement From for tokenizers errors
impl From<tokenizers::Error> for ModelError {
    fn from(err: tokenizers::Error) -> Self {
        ModelError::TokenizerError(err.to_string())
    }
}
