//! gemrelay-gateway — HTTP surface for the Gemini relay
//!
//! Exposes `GET /`, `GET /health`, and `POST /v1/chat` (plus the older
//! `POST /generate` alias) over axum, delegating every chat to the
//! [`gemrelay_core::Dispatcher`].

pub mod error;
pub mod http;
pub mod protocol;
pub mod server;

pub use error::{ApiError, ServerError};
pub use http::create_router;
pub use server::GatewayServer;
