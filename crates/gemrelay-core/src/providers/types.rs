//! Provider-agnostic types for the generation backend

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credential::Credential;

/// Sampling parameters sent with every typed generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.95
}
fn default_top_k() -> u32 {
    40
}
fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: default_top_k(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// One harm category and the threshold at which content is blocked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Harm categories covered by the default safety list, in order
pub const DEFAULT_HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

impl SafetySetting {
    pub fn new(category: impl Into<String>, threshold: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            threshold: threshold.into(),
        }
    }

    /// Block medium-and-above for every default harm category
    pub fn block_medium_and_above() -> Vec<Self> {
        DEFAULT_HARM_CATEGORIES
            .iter()
            .map(|c| Self::new(*c, "BLOCK_MEDIUM_AND_ABOVE"))
            .collect()
    }
}

/// A request-scoped reference to a configured provider model.
///
/// Carries its own credential so concurrent requests never share key state.
#[derive(Debug, Clone)]
pub struct ModelHandle {
    model: String,
    generation: GenerationConfig,
    safety: Vec<SafetySetting>,
    system_instruction: String,
    credential: Credential,
}

impl ModelHandle {
    pub fn new(
        model: &str,
        generation: GenerationConfig,
        safety: Vec<SafetySetting>,
        system_instruction: &str,
        credential: Credential,
    ) -> Result<Self> {
        let model = model.trim().trim_start_matches("models/");
        if model.is_empty() {
            bail!("cannot build a model handle without a model name");
        }
        Ok(Self {
            model: model.to_string(),
            generation,
            safety,
            system_instruction: system_instruction.to_string(),
            credential,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn safety(&self) -> &[SafetySetting] {
        &self.safety
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_token_count: u32,
    pub candidates_token_count: u32,
    pub total_token_count: u32,
}

impl std::fmt::Display for TokenUsage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "prompt_token_count: {}, candidates_token_count: {}, total_token_count: {}",
            self.prompt_token_count, self.candidates_token_count, self.total_token_count
        )
    }
}

/// Result of a successful generation call. `text` may be empty when the
/// provider filtered the output.
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub text: String,
    pub finish_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// A model advertised by the provider for a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Bare model id, without the `models/` prefix
    pub name: String,
    pub supported_methods: Vec<String>,
}

impl ModelInfo {
    pub fn supports_generate_content(&self) -> bool {
        // An empty list means the provider did not say; don't exclude it
        self.supported_methods.is_empty()
            || self.supported_methods.iter().any(|m| m == "generateContent")
    }
}

/// Operations the dispatcher needs from the provider
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Typed generation with the handle's full configuration
    async fn generate(&self, handle: &ModelHandle, prompt: &str) -> Result<Generation>;

    /// Models available to this key
    async fn list_models(&self, api_key: &str) -> Result<Vec<ModelInfo>>;

    /// Minimal REST generation: prompt only, no system instruction or tuning.
    /// Any non-2xx status is an error carrying
    /// [`crate::error::ProviderStatusError`].
    async fn generate_plain(&self, model: &str, api_key: &str, prompt: &str)
    -> Result<Generation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialSource;

    fn cred() -> Credential {
        Credential::new("k", CredentialSource::Caller)
    }

    #[test]
    fn test_default_safety_order() {
        let safety = SafetySetting::block_medium_and_above();
        let categories: Vec<&str> = safety.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(categories, DEFAULT_HARM_CATEGORIES);
        assert!(safety.iter().all(|s| s.threshold == "BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[test]
    fn test_handle_rejects_empty_model() {
        let err = ModelHandle::new(" ", GenerationConfig::default(), vec![], "sys", cred());
        assert!(err.is_err());
    }

    #[test]
    fn test_handle_strips_models_prefix() {
        let handle = ModelHandle::new(
            "models/gemini-1.5-pro",
            GenerationConfig::default(),
            vec![],
            "sys",
            cred(),
        )
        .unwrap();
        assert_eq!(handle.model(), "gemini-1.5-pro");
    }

    #[test]
    fn test_usage_display() {
        let usage = TokenUsage {
            prompt_token_count: 3,
            candidates_token_count: 5,
            total_token_count: 8,
        };
        assert_eq!(
            usage.to_string(),
            "prompt_token_count: 3, candidates_token_count: 5, total_token_count: 8"
        );
    }

    #[test]
    fn test_model_info_supports_generate_content() {
        let embed = ModelInfo {
            name: "embedding-001".to_string(),
            supported_methods: vec!["embedContent".to_string()],
        };
        let gen_model = ModelInfo {
            name: "gemini-pro".to_string(),
            supported_methods: vec!["generateContent".to_string(), "countTokens".to_string()],
        };
        assert!(!embed.supports_generate_content());
        assert!(gen_model.supports_generate_content());
    }
}
