//! Client for the Ollama text-generation service.

pub mod client;
pub mod errors;
pub mod trim;

pub use client::{GenerateOptions, ModelInfo, OllamaClient};
pub use errors::SummarizeError;
pub use trim::trim_to_sentence_boundary;

/// Hard upper bound on a stored summary, in characters.
pub const MAX_SUMMARY_CHARS: usize = 1500;
