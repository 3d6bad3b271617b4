//! LLM provider adapters.

mod gemini;

pub use gemini::{GeminiBackend, GeminiBackendBuilder};
