//! Helpers for the local Ollama runtime.

pub mod ollama_runtime;

pub use ollama_runtime::{DEFAULT_OLLAMA_URL, OllamaRuntime, OllamaRuntimeError, RuntimeState};
