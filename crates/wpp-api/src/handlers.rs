//! HTTP API handlers
//!
//! Request handlers for the WhatsApp session, message sending and the
//! job-status webhook.

use axum::{
    Json,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use wpp_core::DeliveryLogRecord;
use wpp_whatsapp::{
    JobStatusEvent, SendButtonMessageInput, SendResult, normalize_phone_number,
};

use crate::error::{ApiError, Result};
use crate::qr::render_png;
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Text message request payload
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QrCodeResponse {
    pub qrcode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StateResponse {
    pub state: Option<String>,
}

/// Acknowledgement returned to the job system
#[derive(Debug, Serialize, Deserialize)]
pub struct IntegrationResponse {
    pub result: String,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryLogQuery {
    #[serde(default = "default_log_limit")]
    pub limit: usize,
    /// Only rows for this contact (normalized before the lookup)
    pub contact: Option<String>,
}

fn default_log_limit() -> usize {
    50
}

/// Generic API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}

/// Pending pairing QR code, as JSON or a PNG image
pub async fn qrcode(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let code = state.session.qr_code()?;

    let wants_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));
    if wants_json {
        return Ok(Json(QrCodeResponse { qrcode: code }).into_response());
    }

    let code = code.ok_or(ApiError::QrCodeNotAvailable)?;
    let png = render_png(&code)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// Current session state
pub async fn session_state(State(state): State<AppState>) -> Result<Json<StateResponse>> {
    let current = state.session.state()?;
    Ok(Json(StateResponse {
        state: current.map(|s| s.as_str().to_string()),
    }))
}

/// Send a text message to a registered contact
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendResult>> {
    debug!("Send message request for {}", req.contact);
    let result = state.dispatcher.send_text(&req.contact, &req.message).await?;
    Ok(Json(result))
}

/// Send a button message; send failures are reported in `status`
pub async fn send_button_message(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<SendResult>> {
    let input: SendButtonMessageInput =
        serde_json::from_value(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    input.validate()?;

    let outcome = state.dispatcher.send_button_message(&input).await;
    Ok(Json(outcome.into_send_result()))
}

/// Job-status webhook; always acknowledged, whatever the body
pub async fn integration(
    State(state): State<AppState>,
    body: Bytes,
) -> Json<IntegrationResponse> {
    match serde_json::from_slice::<JobStatusEvent>(&body) {
        Ok(event) => {
            info!("Integration event with status {}", event.status_id);
            let outcome = state.recorder.on_job_status(&event).await;
            debug!("Integration event handled: {:?}", outcome);
        }
        Err(e) => warn!("Unrecognized integration payload: {}", e),
    }

    Json(IntegrationResponse {
        result: "Ok".to_string(),
    })
}

/// Most recent delivery log rows, optionally for one contact
pub async fn delivery_log(
    State(state): State<AppState>,
    Query(query): Query<DeliveryLogQuery>,
) -> Result<Json<Vec<DeliveryLogRecord>>> {
    let store = state.recorder.store();
    let rows = match query.contact.as_deref() {
        Some(contact) => store.list_by_contact(&normalize_phone_number(contact), query.limit)?,
        None => store.recent(query.limit)?,
    };
    Ok(Json(rows))
}
