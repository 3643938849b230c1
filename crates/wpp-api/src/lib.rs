//! wpp-api: HTTP API for the WhatsApp relay gateway
//!
//! Exposes the session state, pairing QR code, message sending and the
//! job-status integration webhook. Built with axum.

pub mod error;
pub mod handlers;
pub mod qr;
pub mod routes;
pub mod server;

pub use error::{ApiError, Result};
pub use server::{AppState, start_server};
