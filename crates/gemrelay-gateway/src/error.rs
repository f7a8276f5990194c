//! Gateway error types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gemrelay_core::DispatchError;
use thiserror::Error;
use tracing::error;

use crate::protocol::ErrorDetail;

/// Errors that can occur while running the gateway
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server loop exited with an I/O error
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// A dispatch failure rendered as `500 {"detail": ...}`
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.0.to_string();
        error!(detail = %detail, "Chat request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorDetail { detail })).into_response()
    }
}
