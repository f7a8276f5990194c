//! gemrelay-core — request dispatch for the Gemini relay
//!
//! Resolves a credential per request, builds a request-scoped model handle,
//! and walks the fallback chain (model discovery, plain REST call, user-facing
//! messages) when the primary generation call fails.

pub mod config;
pub mod credential;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod providers;

pub use config::RelayConfig;
pub use credential::{Credential, CredentialSource};
pub use dispatch::{ChatRequest, ChatResponse, Dispatcher};
pub use error::{ConfigError, DispatchError, FailureKind, ProviderStatusError};
pub use providers::{GeminiClient, GenerativeBackend, ModelHandle};
