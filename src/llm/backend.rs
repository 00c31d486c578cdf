use super::types::ModelError;

/// Trait for text generation backends: given a prompt, produce a continuation.
///
/// Implementations hold process-wide model state that is loaded once and
/// read-only afterwards. Callers are expected to serialize invocations (see
/// [`crate::gate::RequestGate`]); implementations must still be `Send + Sync`
/// so a single instance can be shared between the assistant and the store.
pub trait GenerationBackend: Send + Sync {
    /// Generate a continuation for `prompt`
    ///
    /// # Returns
    /// The generated text, or a `ModelError` (`ContextOverflow` when the
    /// prompt does not fit the context window together with the token budget)
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;

    /// Whether the returned text starts with an echo of the prompt
    fn echoes_prompt(&self) -> bool {
        false
    }

    /// Get the backend type identifier (e.g., "candle", "ollama")
    fn backend_type(&self) -> &'static str;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;

    /// Validate that the model is loaded and ready to generate
    fn health_check(&self) -> Result<(), ModelError>;
}
