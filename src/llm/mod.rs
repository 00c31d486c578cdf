// Core backend abstraction
pub mod backend;
pub mod types;

// Device selection
pub mod device;

// Backend implementations
pub mod candle;
pub mod ollama;

pub use backend::GenerationBackend;
pub use candle::{CandleBackend, CandleConfig};
pub use device::{select_device, DeviceKind, DeviceSelector};
pub use ollama::{OllamaBackend, OllamaConfig};
pub use types::{GenerationConfig, ModelError};
