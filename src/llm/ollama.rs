use std::process::{Command, Output};
use std::time::Instant;

use super::backend::GenerationBackend;
use super::types::ModelError;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
}

/// Generation through a locally installed `ollama` binary.
///
/// `ollama run` prints only the continuation, so the prompt is never echoed.
pub struct OllamaBackend {
    model: String,
}

impl OllamaBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    pub fn from_config(config: OllamaConfig) -> Self {
        Self::new(config.model)
    }

    fn ollama(args: &[&str]) -> Result<Output, std::io::Error> {
        Command::new("ollama").args(args).output()
    }
}

impl GenerationBackend for OllamaBackend {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let started = Instant::now();
        let output = Self::ollama(&["run", &self.model, prompt])
            .map_err(|e| ModelError::InferenceError(format!("cannot start ollama: {e}")))?;

        if !output.status.success() {
            return Err(ModelError::InferenceError(format!(
                "ollama run {} failed ({}): {}",
                self.model,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| ModelError::InferenceError(format!("ollama output is not UTF-8: {e}")))?;

        log::debug!(
            "ollama {} generated {} bytes in {:?}",
            self.model,
            text.len(),
            started.elapsed()
        );
        Ok(text.trim().to_string())
    }

    fn backend_type(&self) -> &'static str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn health_check(&self) -> Result<(), ModelError> {
        let output = Self::ollama(&["list"]).map_err(|e| {
            ModelError::HealthCheckError(format!("cannot run `ollama list` ({e}); is ollama installed?"))
        })?;

        let listed = String::from_utf8_lossy(&output.stdout);
        match (output.status.success(), listed.contains(&self.model)) {
            (false, _) => Err(ModelError::HealthCheckError(
                "`ollama list` exited unsuccessfully".to_string(),
            )),
            (true, false) => Err(ModelError::HealthCheckError(format!(
                "model '{0}' is not pulled; run `ollama pull {0}`",
                self.model
            ))),
            (true, true) => Ok(()),
        }
    }
}
