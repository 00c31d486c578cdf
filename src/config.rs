//! Process configuration: environment variables (optionally from a `.env`
//! file) resolved into a typed [`AppConfig`], and the wiring that turns it
//! into a ready assistant.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::assistant::{AssistantConfig, AssistantModel};
use crate::error::AssistantError;
use crate::llm::{
    CandleBackend, CandleConfig, GenerationBackend, GenerationConfig, ModelError, OllamaBackend,
    OllamaConfig,
};
use crate::store::{BertEmbedder, BertEmbedderConfig, RetrievalStore, StoreConfig};

/// Served as-is by ollama; candle needs `MEALWAY_MODEL` to name a
/// llama-family GGUF instead
pub const DEFAULT_MODEL: &str = "LiquidAI/LFM2-1.2B";
pub const DEFAULT_CACHE_DIR: &str = "./models";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_STORE_DIR: &str = "./recipe_store";
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Ports below this are privileged and never bound
const MIN_PORT: u16 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Candle,
    Ollama,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "candle" => Ok(BackendKind::Candle),
            "ollama" => Ok(BackendKind::Ollama),
            _ => Err(format!("unknown backend '{value}'")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Candle => write!(f, "candle"),
            BackendKind::Ollama => write!(f, "ollama"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub model: String,
    pub backend: BackendKind,
    pub cache_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub temperature: f64,
    pub top_p: f64,
    pub max_new_tokens: usize,
    pub context_window: usize,
    pub seed: Option<u64>,
    pub device: Option<String>,
    pub retrieval: bool,
    pub store_dir: PathBuf,
    pub embedding_model: String,
    pub regenerate_on_malformed: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let generation = GenerationConfig::default();

        Self {
            model: DEFAULT_MODEL.to_string(),
            backend: BackendKind::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            temperature: generation.temperature,
            top_p: generation.top_p,
            max_new_tokens: generation.max_new_tokens,
            context_window: generation.context_window,
            seed: None,
            device: None,
            retrieval: false,
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            regenerate_on_malformed: false,
        }
    }
}

impl AppConfig {
    /// Read the process environment, after loading `.env` if one exists
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve every setting through `lookup`; unset or blank values take
    /// the default, unparsable ones are logged and take the default
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            model: get("MEALWAY_MODEL").unwrap_or(defaults.model),
            backend: parse_or(get("MEALWAY_BACKEND"), "MEALWAY_BACKEND", defaults.backend),
            cache_dir: get("MODEL_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            host: get("MEALWAY_HOST").unwrap_or(defaults.host),
            port: resolve_port(get("MEALWAY_PORT")),
            temperature: parse_or(
                get("MEALWAY_TEMPERATURE"),
                "MEALWAY_TEMPERATURE",
                defaults.temperature,
            ),
            top_p: parse_or(get("MEALWAY_TOP_P"), "MEALWAY_TOP_P", defaults.top_p),
            max_new_tokens: parse_or(
                get("MEALWAY_MAX_NEW_TOKENS"),
                "MEALWAY_MAX_NEW_TOKENS",
                defaults.max_new_tokens,
            ),
            context_window: parse_or(
                get("MEALWAY_CONTEXT_WINDOW"),
                "MEALWAY_CONTEXT_WINDOW",
                defaults.context_window,
            ),
            seed: get("MEALWAY_SEED").and_then(|value| match value.parse() {
                Ok(seed) => Some(seed),
                Err(_) => {
                    log::warn!("MEALWAY_SEED='{value}' is not a number; sampling unseeded");
                    None
                }
            }),
            device: get("MEALWAY_DEVICE").map(|value| value.to_lowercase()),
            retrieval: parse_flag(get("MEALWAY_RETRIEVAL"), "MEALWAY_RETRIEVAL"),
            store_dir: get("MEALWAY_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            embedding_model: get("MEALWAY_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            regenerate_on_malformed: parse_flag(
                get("MEALWAY_REGENERATE_ON_MALFORMED"),
                "MEALWAY_REGENERATE_ON_MALFORMED",
            ),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn generation(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
            top_p: self.top_p,
            max_new_tokens: self.max_new_tokens,
            context_window: self.context_window,
            seed: self.seed,
            ..GenerationConfig::default()
        }
    }

    pub fn assistant(&self) -> AssistantConfig {
        AssistantConfig {
            regenerate_on_malformed: self.regenerate_on_malformed,
        }
    }

    /// Load the configured generation backend; failure is fatal for the caller
    pub fn build_backend(&self) -> Result<Arc<dyn GenerationBackend>, ModelError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|e| {
            ModelError::LoadError(format!(
                "cannot create model cache {:?}: {}",
                self.cache_dir, e
            ))
        })?;

        let backend: Arc<dyn GenerationBackend> = match self.backend {
            BackendKind::Candle => {
                let config = CandleConfig {
                    model_path: CandleConfig::resolve(&self.model, &self.cache_dir)?,
                    generation: self.generation(),
                    device: self.device.clone(),
                };
                Arc::new(CandleBackend::load(config)?)
            }
            BackendKind::Ollama => Arc::new(OllamaBackend::from_config(OllamaConfig {
                model: self.model.clone(),
            })),
        };

        backend.health_check().map_err(|e| {
            ModelError::LoadError(format!(
                "{} backend for '{}' is not usable: {}",
                backend.backend_type(),
                self.model,
                e
            ))
        })?;

        log::info!(
            "generation backend ready: {} ({})",
            backend.backend_type(),
            backend.model_name()
        );
        Ok(backend)
    }

    /// The recipe store, when retrieval is enabled
    pub fn build_store(
        &self,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Option<RetrievalStore>, AssistantError> {
        if !self.retrieval {
            return Ok(None);
        }

        let embedder = BertEmbedder::load(BertEmbedderConfig {
            device: self.device.clone(),
            ..BertEmbedderConfig::resolve(&self.embedding_model, &self.cache_dir)
        })?;

        let store = RetrievalStore::open(
            StoreConfig {
                directory: Some(self.store_dir.clone()),
                ..StoreConfig::default()
            },
            Arc::new(embedder),
            backend,
        )?;

        Ok(Some(store))
    }

    /// Backend, optional store and assistant, fully wired
    pub fn build_assistant(&self) -> Result<AssistantModel, AssistantError> {
        let backend = self.build_backend()?;
        let store = self.build_store(backend.clone())?;

        let model = AssistantModel::new(backend, self.assistant());
        Ok(match store {
            Some(store) => model.with_store(store),
            None => model,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(value) => value.parse().unwrap_or_else(|_| {
            log::warn!("{key}='{value}' is invalid; using the default");
            default
        }),
        None => default,
    }
}

fn parse_flag(value: Option<String>, key: &str) -> bool {
    match value.as_deref().map(str::to_lowercase).as_deref() {
        None => false,
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        Some(other) => {
            log::warn!("{key}='{other}' is not a boolean; treating as false");
            false
        }
    }
}

/// Unset, unparsable and privileged ports all fall back to the default
fn resolve_port(value: Option<String>) -> u16 {
    match value.map(|value| value.parse::<u16>()) {
        Some(Ok(port)) if port >= MIN_PORT => port,
        Some(Ok(port)) => {
            log::warn!("MEALWAY_PORT={port} is below {MIN_PORT}; using {DEFAULT_PORT}");
            DEFAULT_PORT
        }
        Some(Err(error)) => {
            log::warn!("MEALWAY_PORT is invalid ({error}); using {DEFAULT_PORT}");
            DEFAULT_PORT
        }
        None => DEFAULT_PORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = config_from(&[]);

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model, "LiquidAI/LFM2-1.2B");
        assert_eq!(config.cache_dir, PathBuf::from("./models"));
        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.temperature, 0.5);
        assert!(!config.retrieval);
        assert!(!config.regenerate_on_malformed);
    }

    #[test]
    fn privileged_port_falls_back_to_default() {
        assert_eq!(config_from(&[("MEALWAY_PORT", "42")]).port, 5000);
        assert_eq!(config_from(&[("MEALWAY_PORT", "8080")]).port, 8080);
        assert_eq!(config_from(&[("MEALWAY_PORT", "80")]).port, 80);
        assert_eq!(config_from(&[("MEALWAY_PORT", "http")]).port, 5000);
    }

    #[test]
    fn blank_values_are_unset() {
        let config = config_from(&[("MEALWAY_MODEL", "  "), ("MEALWAY_HOST", "")]);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.host, DEFAULT_HOST);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("MEALWAY_MODEL", "llama3"),
            ("MEALWAY_BACKEND", "Ollama"),
            ("MEALWAY_SEED", "7"),
            ("MEALWAY_DEVICE", "CPU"),
            ("MEALWAY_RETRIEVAL", "true"),
            ("MEALWAY_REGENERATE_ON_MALFORMED", "1"),
            ("MEALWAY_MAX_NEW_TOKENS", "256"),
        ]);

        assert_eq!(config.backend, BackendKind::Ollama);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.device.as_deref(), Some("cpu"));
        assert!(config.retrieval);
        assert!(config.assistant().regenerate_on_malformed);

        let generation = config.generation();
        assert_eq!(generation.max_new_tokens, 256);
        assert_eq!(generation.seed, Some(7));
    }

    #[test]
    fn invalid_values_take_defaults() {
        let config = config_from(&[
            ("MEALWAY_BACKEND", "gpt"),
            ("MEALWAY_TEMPERATURE", "warm"),
            ("MEALWAY_RETRIEVAL", "maybe"),
        ]);

        assert_eq!(config.backend, BackendKind::Candle);
        assert_eq!(config.temperature, 0.5);
        assert!(!config.retrieval);
    }

    #[test]
    fn missing_model_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            model: "no-such-model".to_string(),
            cache_dir: dir.path().join("models"),
            ..AppConfig::default()
        };

        assert!(matches!(
            config.build_backend(),
            Err(ModelError::LoadError(_))
        ));
        assert!(dir.path().join("models").is_dir());
    }

    #[test]
    fn unavailable_ollama_model_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            backend: BackendKind::Ollama,
            model: "mealway-no-such-model-xyz".to_string(),
            cache_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };

        let error = config.build_assistant().err().expect("startup must fail");
        assert!(error.is_fatal(), "unexpected error: {error}");
    }
}
