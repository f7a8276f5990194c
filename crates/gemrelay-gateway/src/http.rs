//! HTTP routes

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use gemrelay_core::{ChatRequest, ChatResponse, Dispatcher};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ApiError;
use crate::protocol::{BannerResponse, HealthResponse, HealthStatus};

/// Create the HTTP router with all routes configured
pub fn create_router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(banner))
        .route("/health", get(health))
        .route("/v1/chat", post(chat))
        .route("/generate", post(chat))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(dispatcher)
}

async fn banner(State(dispatcher): State<Arc<Dispatcher>>) -> Json<BannerResponse> {
    Json(BannerResponse {
        status: dispatcher.config().banner.clone(),
    })
}

async fn health(State(dispatcher): State<Arc<Dispatcher>>) -> Json<HealthResponse> {
    let configured = dispatcher.has_fallback_key();
    Json(HealthResponse {
        status: HealthStatus::from_key_present(configured),
        api_key_configured: configured,
        model: dispatcher.config().provider.preferred_model.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn chat(
    State(dispatcher): State<Arc<Dispatcher>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    debug!(has_caller_key = request.api_key.is_some(), "POST chat");
    let response = dispatcher.chat(request).await?;
    Ok(Json(response))
}
