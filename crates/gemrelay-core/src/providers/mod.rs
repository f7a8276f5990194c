//! Generation backend abstraction
//!
//! The dispatcher talks to the provider only through [`GenerativeBackend`].
//! [`GeminiClient`] is the production implementation over the Gemini REST API.

pub mod google;
pub mod types;

pub use google::GeminiClient;
pub use types::{
    Generation, GenerationConfig, GenerativeBackend, ModelHandle, ModelInfo, SafetySetting,
    TokenUsage,
};
