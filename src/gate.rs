//! Single-flight access to the assistant.
//!
//! The model and its KV cache are not reentrant, so at most one generation
//! runs at a time; concurrent callers wait their turn.

use std::sync::Mutex;

use crate::error::AssistantError;

pub struct RequestGate<T> {
    inner: Mutex<T>,
}

impl<T> RequestGate<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Run `f` with exclusive access, blocking until the gate is free
    pub fn run<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, AssistantError>,
    ) -> Result<R, AssistantError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AssistantError::GatePoisoned)?;

        f(&mut guard)
    }

    pub fn into_inner(self) -> Result<T, AssistantError> {
        self.inner
            .into_inner()
            .map_err(|_| AssistantError::GatePoisoned)
    }
}
