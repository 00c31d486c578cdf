use thiserror::Error;

use crate::llm::ModelError;

/// Errors surfaced by the assistant core to the request boundary
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("template '{template}' requires field '{field}'")]
    MissingField {
        template: &'static str,
        field: &'static str,
    },

    #[error("{pipeline} output could not be parsed: {reason}")]
    MalformedModelOutput {
        pipeline: &'static str,
        reason: String,
    },

    #[error("recipe store is empty or disabled; nothing to retrieve from")]
    IndexUnavailable,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("store persistence failed: {0}")]
    Storage(String),

    #[error("request gate poisoned by a panicked generation")]
    GatePoisoned,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AssistantError {
    pub(crate) fn malformed(pipeline: &'static str, reason: impl Into<String>) -> Self {
        AssistantError::MalformedModelOutput {
            pipeline,
            reason: reason.into(),
        }
    }

    /// Whether the backend failed to initialize, which must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, AssistantError::Model(ModelError::LoadError(_)))
    }
}

impl From<candle_core::Error> for AssistantError {
    fn from(err: candle_core::Error) -> Self {
        AssistantError::Embedding(err.to_string())
    }
}
