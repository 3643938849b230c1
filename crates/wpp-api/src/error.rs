//! エラー型定義 (wpp-api)

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;
use wpp_whatsapp::WhatsAppError;

use crate::handlers::ErrorResponse;

/// wpp-api のエラー型
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("No QR code is pending")]
    QrCodeNotAvailable,

    #[error("QR code rendering failed: {0}")]
    QrRender(String),

    #[error(transparent)]
    WhatsApp(#[from] WhatsAppError),

    #[error("Core error: {0}")]
    Core(#[from] wpp_core::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::QrCodeNotAvailable => StatusCode::NOT_FOUND,
            ApiError::QrRender(_) | ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::WhatsApp(e) => match e {
                WhatsAppError::InvalidInput(_) | WhatsAppError::ContactNotRegistered(_) => {
                    StatusCode::BAD_REQUEST
                }
                WhatsAppError::SessionNotReady
                | WhatsAppError::DriverUnavailable
                | WhatsAppError::AuthFailure(_)
                | WhatsAppError::CredentialStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                WhatsAppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                WhatsAppError::Driver(_) | WhatsAppError::Http(_) | WhatsAppError::Core(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, ApiError>;
