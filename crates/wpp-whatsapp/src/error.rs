//! Error types for wpp-whatsapp

use std::time::Duration;

use thiserror::Error;

/// wpp-whatsapp error type
#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("WhatsApp session is not ready")]
    SessionNotReady,

    #[error("The contact number is not registered on WhatsApp: {0}")]
    ContactNotRegistered(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("WhatsApp driver has not been constructed yet")]
    DriverUnavailable,

    #[error("Credential store unavailable: {0}")]
    CredentialStoreUnavailable(String),

    #[error("Authentication failure: {0}")]
    AuthFailure(String),

    #[error("Driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Core error: {0}")]
    Core(#[from] wpp_core::Error),
}

impl From<reqwest::Error> for WhatsAppError {
    fn from(err: reqwest::Error) -> Self {
        WhatsAppError::Http(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WhatsAppError>;
