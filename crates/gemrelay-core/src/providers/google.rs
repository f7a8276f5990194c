//! Google Gemini generateContent client

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::types::{
    Generation, GenerationConfig, GenerativeBackend, ModelHandle, ModelInfo, SafetySetting,
    TokenUsage,
};
use crate::config::ProviderConfig;
use crate::error::ProviderStatusError;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// HTTP client for the Gemini generative-language API.
///
/// Holds no credential: every call takes its key from the handle or argument.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_version: String,
    plain_timeout: Duration,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("plain_timeout", &self.plain_timeout)
            .finish()
    }
}

// ── Wire types ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<WireGenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    safety_settings: Option<&'a [SafetySetting]>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

impl From<&GenerationConfig> for WireGenerationConfig {
    fn from(c: &GenerationConfig) -> Self {
        Self {
            temperature: c.temperature,
            top_p: c.top_p,
            top_k: c.top_k,
            max_output_tokens: c.max_output_tokens,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireModel {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

impl GenerateContentResponse {
    fn first_candidate_parts(&self) -> impl Iterator<Item = &str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
    }

    fn finish_reason(&self) -> Option<String> {
        self.candidates
            .first()
            .and_then(|c| c.finish_reason.clone())
            .or_else(|| {
                self.prompt_feedback
                    .as_ref()
                    .and_then(|f| f.block_reason.clone())
            })
    }

    fn usage(&self) -> Option<TokenUsage> {
        self.usage_metadata.as_ref().map(|u| TokenUsage {
            prompt_token_count: u.prompt_token_count,
            candidates_token_count: u.candidates_token_count,
            total_token_count: u.total_token_count,
        })
    }

    /// All text parts of the first candidate, concatenated
    fn into_generation(self) -> Generation {
        Generation {
            text: self.first_candidate_parts().collect::<String>(),
            finish_reason: self.finish_reason(),
            usage: self.usage(),
        }
    }

    /// Only the first text part of the first candidate
    fn into_first_part_generation(self) -> Generation {
        Generation {
            text: self
                .first_candidate_parts()
                .next()
                .unwrap_or_default()
                .to_string(),
            finish_reason: self.finish_reason(),
            usage: self.usage(),
        }
    }
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_version: impl Into<String>,
        plain_timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
            plain_timeout,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.api_version,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/{}/models/{}:generateContent",
            self.base_url, self.api_version, model
        )
    }

    fn models_url(&self) -> String {
        format!("{}/{}/models", self.base_url, self.api_version)
    }

    async fn post_generate(
        &self,
        model: &str,
        api_key: &str,
        body: &GenerateContentRequest<'_>,
        timeout: Option<Duration>,
    ) -> Result<GenerateContentResponse> {
        let url = self.generate_url(model);
        debug!(model = model, "Gemini generateContent request");

        let mut req = self
            .http
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(body);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to send Gemini request for model {model}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderStatusError {
                operation: "generateContent",
                status,
                body,
            }
            .into());
        }

        response
            .json()
            .await
            .context("Failed to parse Gemini generateContent response")
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(&self, handle: &ModelHandle, prompt: &str) -> Result<Generation> {
        let system = handle.system_instruction();
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: (!system.trim().is_empty()).then(|| Content {
                role: None,
                parts: vec![Part { text: system }],
            }),
            generation_config: Some(handle.generation().into()),
            safety_settings: Some(handle.safety()),
        };

        let response = self
            .post_generate(handle.model(), handle.credential().key(), &body, None)
            .await?;
        let generation = response.into_generation();

        debug!(
            model = handle.model(),
            chars = generation.text.len(),
            finish_reason = generation.finish_reason.as_deref().unwrap_or("-"),
            "Gemini generateContent response"
        );
        Ok(generation)
    }

    async fn list_models(&self, api_key: &str) -> Result<Vec<ModelInfo>> {
        let response = self
            .http
            .get(self.models_url())
            .query(&[("pageSize", "1000")])
            .header(API_KEY_HEADER, api_key)
            .timeout(self.plain_timeout)
            .send()
            .await
            .context("Failed to send Gemini list models request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderStatusError {
                operation: "list models",
                status,
                body,
            }
            .into());
        }

        let list: ListModelsResponse = response
            .json()
            .await
            .context("Failed to parse Gemini list models response")?;

        debug!(models = list.models.len(), "Gemini list models response");

        Ok(list
            .models
            .into_iter()
            .map(|m| ModelInfo {
                name: m.name.trim_start_matches("models/").to_string(),
                supported_methods: m.supported_generation_methods,
            })
            .collect())
    }

    async fn generate_plain(
        &self,
        model: &str,
        api_key: &str,
        prompt: &str,
    ) -> Result<Generation> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: None,
            generation_config: None,
            safety_settings: None,
        };

        let response = self
            .post_generate(model, api_key, &body, Some(self.plain_timeout))
            .await?;
        Ok(response.into_first_part_generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Credential, CredentialSource};
    use crate::error::FailureKind;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn handle(model: &str) -> ModelHandle {
        ModelHandle::new(
            model,
            GenerationConfig::default(),
            SafetySetting::block_medium_and_above(),
            "You are terse.",
            Credential::new("test-key", CredentialSource::Caller),
        )
        .unwrap()
    }

    fn client(base: &str) -> GeminiClient {
        GeminiClient::new(base, "v1beta", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_request_serialization() {
        let generation = GenerationConfig::default();
        let safety = SafetySetting::block_medium_and_above();
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "hi" }],
            }],
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part { text: "sys" }],
            }),
            generation_config: Some((&generation).into()),
            safety_settings: Some(&safety),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(
            json["safetySettings"][0]["category"],
            "HARM_CATEGORY_HARASSMENT"
        );
        assert_eq!(
            json["safetySettings"][3]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }

    #[test]
    fn test_plain_request_has_only_contents() {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part { text: "hi" }],
            }],
            system_instruction: None,
            generation_config: None,
            safety_settings: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, json!({"contents": [{"parts": [{"text": "hi"}]}]}));
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {"parts": [{"text": "Hello, "}, {"text": "world"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6}
        }))
        .unwrap();
        let generation = response.into_generation();
        assert_eq!(generation.text, "Hello, world");
        assert_eq!(generation.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(generation.usage.unwrap().total_token_count, 6);
    }

    #[test]
    fn test_response_first_part_only() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "one"}, {"text": "two"}]}}]
        }))
        .unwrap();
        assert_eq!(response.into_first_part_generation().text, "one");
    }

    #[test]
    fn test_blocked_prompt_yields_empty_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": {"blockReason": "SAFETY"}
        }))
        .unwrap();
        let generation = response.into_generation();
        assert!(generation.text.is_empty());
        assert_eq!(generation.finish_reason.as_deref(), Some("SAFETY"));
        assert!(generation.usage.is_none());
    }

    #[tokio::test]
    async fn test_generate_sends_full_request() {
        let seen: Arc<Mutex<Option<(String, String, Value)>>> = Arc::new(Mutex::new(None));
        let seen_in = seen.clone();
        let router = Router::new().route(
            "/v1beta/models/{action}",
            post(
                move |Path(action): Path<String>, headers: HeaderMap, Json(body): Json<Value>| {
                    let seen = seen_in.clone();
                    async move {
                        let key = headers
                            .get(API_KEY_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() = Some((action, key, body));
                        Json(json!({
                            "candidates": [{"content": {"parts": [{"text": "pong"}]}, "finishReason": "STOP"}],
                            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2}
                        }))
                    }
                },
            ),
        );
        let base = spawn_stub(router).await;

        let generation = client(&base)
            .generate(&handle("gemini-1.5-flash"), "ping")
            .await
            .unwrap();
        assert_eq!(generation.text, "pong");
        assert_eq!(generation.usage.unwrap().total_token_count, 2);

        let (action, key, body) = seen.lock().unwrap().clone().unwrap();
        assert_eq!(action, "gemini-1.5-flash:generateContent");
        assert_eq!(key, "test-key");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "ping");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "You are terse.");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_generate_error_carries_status() {
        let router = Router::new().route(
            "/v1beta/models/{action}",
            post(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({"error": {"code": 404, "message": "models/x is not found", "status": "NOT_FOUND"}})),
                )
            }),
        );
        let base = spawn_stub(router).await;

        let err = client(&base)
            .generate(&handle("gemini-x"), "hi")
            .await
            .unwrap_err();
        let reply = err.downcast_ref::<ProviderStatusError>().unwrap();
        assert_eq!(reply.status, StatusCode::NOT_FOUND);
        assert!(reply.body.contains("is not found"));
        assert_eq!(FailureKind::classify(&err), FailureKind::ModelUnavailable);
    }

    #[tokio::test]
    async fn test_generate_invalid_key_body_is_preserved() {
        let router = Router::new().route(
            "/v1beta/models/{action}",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": {"code": 400, "message": "API key not valid.", "details": [{"reason": "API_KEY_INVALID"}]}})),
                )
            }),
        );
        let base = spawn_stub(router).await;

        let err = client(&base)
            .generate(&handle("gemini-1.5-flash"), "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("API_KEY_INVALID"));
        assert_eq!(FailureKind::classify(&err), FailureKind::InvalidCredential);
    }

    #[tokio::test]
    async fn test_generate_plain_sends_minimal_body() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let seen_in = seen.clone();
        let router = Router::new().route(
            "/v1beta/models/{action}",
            post(move |Json(body): Json<Value>| {
                let seen = seen_in.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!({
                        "candidates": [{"content": {"parts": [{"text": "first"}, {"text": "second"}]}}]
                    }))
                }
            }),
        );
        let base = spawn_stub(router).await;

        let generation = client(&base)
            .generate_plain("gemini-pro", "k", "hello")
            .await
            .unwrap();
        assert_eq!(generation.text, "first");
        assert!(generation.usage.is_none());

        let body = seen.lock().unwrap().clone().unwrap();
        assert!(body.get("systemInstruction").is_none());
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("safetySettings").is_none());
    }

    #[tokio::test]
    async fn test_list_models_strips_prefix() {
        let router = Router::new().route(
            "/v1beta/models",
            get(|| async {
                Json(json!({
                    "models": [
                        {"name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"]},
                        {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]}
                    ]
                }))
            }),
        );
        let base = spawn_stub(router).await;

        let models = client(&base).list_models("k").await.unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "gemini-1.5-pro");
        assert!(models[0].supports_generate_content());
        assert!(!models[1].supports_generate_content());
    }

    #[tokio::test]
    async fn test_connection_failure_is_error() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client(&format!("http://{}", addr))
            .generate(&handle("gemini-1.5-flash"), "hi")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to send Gemini request"));
        assert!(err.downcast_ref::<ProviderStatusError>().is_none());
        assert_eq!(FailureKind::classify(&err), FailureKind::Unclassified);
    }

    #[test]
    fn test_debug_and_urls() {
        let c = GeminiClient::new("http://localhost/", "v1beta", Duration::from_secs(1)).unwrap();
        let debug = format!("{:?}", c);
        assert!(debug.contains("http://localhost"));
        assert_eq!(c.generate_url("m"), "http://localhost/v1beta/models/m:generateContent");
    }
}
