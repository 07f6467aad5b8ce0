//! Answer generation collaborators.

pub mod generator;

pub use generator::{AnswerGenerator, GenerateFuture, GenerationRequest, OllamaGenerator};
