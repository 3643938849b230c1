//! Driver seam
//!
//! The driver owns the messaging protocol and its cryptographic session.
//! It reports progress as [`DriverEvent`]s on an mpsc channel consumed by
//! the [`SessionManager`](crate::session::SessionManager).

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::{Result, WhatsAppError};
use crate::types::{ButtonMessage, MessageId, NumberId};

/// Channel capacity between a driver and the session manager
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events raised by the driver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DriverEvent {
    /// A pairing code was issued
    Qr(String),
    Authenticated,
    Ready,
    AuthFailure(String),
    Disconnected(String),
    /// The credential store saved the session
    SessionSaved,
    Loading { percent: u8, message: String },
    MessageAck { id: String, ack: i32 },
}

pub type DriverEventSender = mpsc::Sender<DriverEvent>;
pub type DriverEventReceiver = mpsc::Receiver<DriverEvent>;

pub fn event_channel() -> (DriverEventSender, DriverEventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Messaging network driver
#[async_trait]
pub trait WppDriver: Send + Sync {
    /// Start or restart the connection; outcome arrives as events
    async fn initialize(&self) -> Result<()>;

    /// Registration record for bare digits, `None` when not registered
    async fn number_id(&self, address: &str) -> Result<Option<NumberId>>;

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<MessageId>;

    async fn send_buttons(&self, chat_id: &str, message: &ButtonMessage) -> Result<MessageId>;
}

/// Run a driver call under a deadline
pub async fn with_deadline<T, F>(deadline: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(WhatsAppError::Timeout(deadline)),
    }
}
