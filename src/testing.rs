//! Test doubles shared by the unit tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::llm::{GenerationBackend, ModelError};
use crate::store::{normalize_embedding, Embedder, Embedding};

/// Replies with scripted responses (or errors) in order and records every
/// prompt
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    prompts: Mutex<Vec<String>>,
    echo: bool,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|reply| Ok(reply.into())).collect()),
            prompts: Mutex::new(Vec::new()),
            echo: false,
        }
    }

    /// Queue a backend failure after the scripted replies
    pub fn then_fail(self, error: ModelError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// Prefix every reply with the prompt, like a pipeline returning full text
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl GenerationBackend for ScriptedBackend {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::InferenceError("no scripted reply left".to_string()))??;

        if self.echo {
            Ok(format!("{prompt}{reply}"))
        } else {
            Ok(reply)
        }
    }

    fn echoes_prompt(&self) -> bool {
        self.echo
    }

    fn backend_type(&self) -> &'static str {
        "scripted"
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn health_check(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Answers every prompt with the same text after a delay, recording the
/// start and end of each call
pub struct TimedBackend {
    reply: String,
    delay: Duration,
    calls: Mutex<Vec<(Instant, Instant)>>,
}

impl TimedBackend {
    pub fn new(reply: impl Into<String>, delay: Duration) -> Self {
        Self {
            reply: reply.into(),
            delay,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Instant, Instant)> {
        self.calls.lock().unwrap().clone()
    }
}

impl GenerationBackend for TimedBackend {
    fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
        let start = Instant::now();
        thread::sleep(self.delay);
        let end = Instant::now();
        self.calls.lock().unwrap().push((start, end));
        Ok(self.reply.clone())
    }

    fn backend_type(&self) -> &'static str {
        "timed"
    }

    fn model_name(&self) -> &str {
        "timed"
    }

    fn health_check(&self) -> Result<(), ModelError> {
        Ok(())
    }
}

/// Bag-of-words embedder: texts sharing words get similar vectors
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, ModelError> {
        let mut embedding = vec![0.0; self.dimension];

        for word in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            embedding[(hasher.finish() % self.dimension as u64) as usize] += 1.0;
        }

        normalize_embedding(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}
