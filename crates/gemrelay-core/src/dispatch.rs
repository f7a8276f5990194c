//! Request dispatcher and fallback chain
//!
//! Each call resolves its own credential and builds its own [`ModelHandle`],
//! so concurrent requests share nothing mutable. When the primary generation
//! fails, the chain is:
//!
//! 1. invalid key (403 / `API_KEY_INVALID`) → explanatory message
//! 2. model discovery → retry with the discovered model
//! 3. not found (404) → plain REST call over the configured model list
//! 4. anything else → [`DispatchError::Upstream`]

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::RelayConfig;
use crate::credential::Credential;
use crate::discovery;
use crate::error::{DispatchError, FailureKind};
use crate::providers::{Generation, GenerativeBackend, ModelHandle};

pub const DEMO_PREFIX: &str = "[DEMO MODE] ";
pub const INVALID_KEY_MESSAGE: &str =
    "The provided API key appears to be invalid. Please check your Gemini API key configuration.";
pub const EMPTY_RESPONSE_MESSAGE: &str =
    "The model returned an empty response or the content was blocked by safety filters.";

/// Incoming chat request
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub system_instruction: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Accepted for compatibility; not forwarded
    #[serde(default)]
    pub history: Vec<Value>,
    /// Accepted for compatibility; not forwarded
    #[serde(default)]
    pub context: Option<Value>,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_instruction: None,
            api_key: None,
            history: Vec::new(),
            context: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// Outgoing chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub usage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatResponse {
    /// Plain message with no usage or model info
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            usage: None,
            fallback: None,
            model: None,
        }
    }

    fn demo(prompt: &str) -> Self {
        Self::message(format!("{DEMO_PREFIX}{prompt}"))
    }

    /// Build from a generation; empty text becomes the empty/blocked message
    fn from_generation(generation: Generation, model: &str, fallback: bool) -> Self {
        if generation.text.trim().is_empty() {
            warn!(
                model = model,
                finish_reason = generation.finish_reason.as_deref().unwrap_or("-"),
                "Provider returned empty text"
            );
            return Self::message(EMPTY_RESPONSE_MESSAGE);
        }
        Self {
            response: generation.text,
            usage: generation.usage.map(|u| u.to_string()),
            fallback: fallback.then_some(true),
            model: fallback.then(|| model.to_string()),
        }
    }
}

/// Routes chat requests to the provider and applies the fallback chain
pub struct Dispatcher {
    backend: Arc<dyn GenerativeBackend>,
    config: RelayConfig,
    fallback_key: Option<String>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        config: RelayConfig,
        fallback_key: Option<String>,
    ) -> Self {
        let fallback_key = fallback_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            backend,
            config,
            fallback_key,
        }
    }

    /// Whether a process-wide key is configured. Caller keys never affect this.
    pub fn has_fallback_key(&self) -> bool {
        self.fallback_key.is_some()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, DispatchError> {
        let request_id = uuid::Uuid::new_v4();
        let span = info_span!("chat", %request_id);
        self.chat_inner(request).instrument(span).await
    }

    async fn chat_inner(&self, request: ChatRequest) -> Result<ChatResponse, DispatchError> {
        let Some(credential) = Credential::resolve(
            request.api_key.as_deref(),
            self.fallback_key.as_deref(),
        ) else {
            info!("No API key available, answering in demo mode");
            return Ok(ChatResponse::demo(&request.prompt));
        };

        debug!(
            source = %credential.source(),
            prompt_chars = request.prompt.len(),
            "Dispatching chat request"
        );

        let system_instruction = request
            .system_instruction
            .as_deref()
            .unwrap_or(&self.config.default_system_instruction);

        let preferred = self.config.provider.preferred_model.as_str();
        let (kind, failure) = match self.build_handle(preferred, system_instruction, &credential) {
            Ok(handle) => match self.backend.generate(&handle, &request.prompt).await {
                Ok(generation) => {
                    return Ok(ChatResponse::from_generation(generation, preferred, false));
                }
                Err(e) => (FailureKind::classify(&e), format!("{e:#}")),
            },
            Err(e) => (FailureKind::Unclassified, format!("{e:#}")),
        };

        warn!(kind = %kind, error = %failure, "Primary generation failed");

        if kind == FailureKind::InvalidCredential {
            return Ok(ChatResponse::message(INVALID_KEY_MESSAGE));
        }

        if self.config.provider.discovery {
            if let Some(response) = self
                .try_discovered(&credential, system_instruction, &request.prompt)
                .await
            {
                return Ok(response);
            }
        }

        if kind == FailureKind::ModelUnavailable {
            if let Some(response) = self.try_rest_fallback(&credential, &request.prompt).await {
                return Ok(response);
            }
            warn!("Every REST fallback model failed");
        }

        Err(DispatchError::Upstream(failure))
    }

    fn build_handle(
        &self,
        model: &str,
        system_instruction: &str,
        credential: &Credential,
    ) -> anyhow::Result<ModelHandle> {
        ModelHandle::new(
            model,
            self.config.generation,
            self.config.safety.clone(),
            system_instruction,
            credential.clone(),
        )
    }

    /// Enumerate models for the credential and retry with the best pick.
    /// Returns `None` when discovery yields nothing new or the retry fails.
    async fn try_discovered(
        &self,
        credential: &Credential,
        system_instruction: &str,
        prompt: &str,
    ) -> Option<ChatResponse> {
        let models = match self.backend.list_models(credential.key()).await {
            Ok(models) => models,
            Err(e) => {
                debug!(error = %e, "Model discovery failed");
                return None;
            }
        };

        let picked = discovery::pick_model(&models)?;
        if picked == self.config.provider.preferred_model.trim().trim_start_matches("models/") {
            debug!(model = picked, "Discovery picked the model that already failed");
            return None;
        }

        let handle = self.build_handle(picked, system_instruction, credential).ok()?;
        match self.backend.generate(&handle, prompt).await {
            Ok(generation) => {
                info!(model = picked, "Recovered with discovered model");
                Some(ChatResponse::from_generation(generation, picked, true))
            }
            Err(e) => {
                warn!(model = picked, error = %e, "Discovered model failed");
                None
            }
        }
    }

    /// Plain REST calls over the configured model list, first success wins
    async fn try_rest_fallback(&self, credential: &Credential, prompt: &str) -> Option<ChatResponse> {
        for model in &self.config.provider.rest_fallback_models {
            match self
                .backend
                .generate_plain(model, credential.key(), prompt)
                .await
            {
                Ok(generation) => {
                    info!(model = model.as_str(), "Recovered with REST fallback");
                    return Some(ChatResponse::from_generation(generation, model, true));
                }
                Err(e) => {
                    warn!(model = model.as_str(), error = %e, "REST fallback model failed");
                }
            }
        }
        None
    }
}
