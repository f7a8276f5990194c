//! JSON bodies for the HTTP surface that aren't owned by the dispatcher

use serde::{Deserialize, Serialize};

/// `GET /`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BannerResponse {
    pub status: String,
}

/// `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// True iff a process-wide key is set
    pub api_key_configured: bool,
    pub model: String,
    pub timestamp: String,
}

/// Readiness as reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ready,
    MissingApiKey,
}

impl HealthStatus {
    pub fn from_key_present(present: bool) -> Self {
        if present {
            Self::Ready
        } else {
            Self::MissingApiKey
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => write!(f, "ready"),
            Self::MissingApiKey => write!(f, "missing_api_key"),
        }
    }
}

/// Body of a 500 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}
