//! Error types and provider failure classification

use thiserror::Error;

/// Errors surfaced to callers of [`crate::Dispatcher::chat`].
///
/// Anticipated provider failures are turned into explanatory responses, so
/// only unclassified upstream failures reach this type.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Unrecognised provider failure, carrying the raw message
    #[error("{0}")]
    Upstream(String),
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Non-success HTTP reply from the provider
#[derive(Debug, Error)]
#[error("Gemini {operation} failed with status {status}: {body}")]
pub struct ProviderStatusError {
    pub operation: &'static str,
    pub status: reqwest::StatusCode,
    pub body: String,
}

/// How a failed provider call should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 403 or `API_KEY_INVALID`
    InvalidCredential,
    /// 404 or "not found"
    ModelUnavailable,
    Unclassified,
}

impl FailureKind {
    /// Classify a failed provider call.
    ///
    /// Only provider replies ([`ProviderStatusError`]) are inspected; transport,
    /// decoding, and local errors are always unclassified.
    pub fn classify(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<ProviderStatusError>() {
            Some(reply) => Self::from_reply(reply.status.as_u16(), &reply.body),
            None => Self::Unclassified,
        }
    }

    /// Classify a provider reply by status code and body.
    ///
    /// Invalid-credential signatures win over not-found signatures when both
    /// appear in the same reply.
    pub fn from_reply(status: u16, body: &str) -> Self {
        if status == 403 || body.contains("API_KEY_INVALID") {
            return Self::InvalidCredential;
        }
        if status == 404 || body.to_lowercase().contains("not found") {
            return Self::ModelUnavailable;
        }
        Self::Unclassified
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCredential => write!(f, "invalid_credential"),
            Self::ModelUnavailable => write!(f, "model_unavailable"),
            Self::Unclassified => write!(f, "unclassified"),
        }
    }
}
