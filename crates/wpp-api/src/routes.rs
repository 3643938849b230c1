//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    delivery_log, health, integration, qrcode, send_button_message, send_message, session_state,
};
use crate::server::AppState;

/// Create the API router
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Session
        .route("/wpp/qrcode", get(qrcode))
        .route("/wpp/state", get(session_state))
        // Messaging
        .route("/wpp/send-message", post(send_message))
        .route("/wpp/send-button-message", post(send_button_message))
        .route("/wpp/delivery-log", get(delivery_log))
        // Job system webhook
        .route("/integration", post(integration))
}
