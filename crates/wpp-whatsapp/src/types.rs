//! Shared types for the WhatsApp relay

use serde::{Deserialize, Serialize};

use crate::error::{Result, WhatsAppError};

/// Status label returned by a successful text send
pub const STATUS_OK: &str = "OK";

/// Status label returned by a successful button send
pub const STATUS_BUTTON_SENT: &str = "Envio OK";

/// Identifier the network assigns to a sent message
pub type MessageId = String;

/// Lifecycle state of the WhatsApp session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    QrPending,
    Ready,
    Disconnected,
    AuthFailed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "UNINITIALIZED",
            SessionState::Initializing => "INITIALIZING",
            SessionState::QrPending => "QR_PENDING",
            SessionState::Ready => "READY",
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::AuthFailed => "AUTH_FAILED",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registration record the driver returns for a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberId {
    /// Bare digits of the registered account
    pub user: String,
    /// Network segment the account belongs to (e.g. `c.us`)
    pub server: String,
}

impl NumberId {
    pub fn chat_id(&self) -> String {
        format!("{}@{}", self.user, self.server)
    }
}

/// A recipient resolved for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub raw_input: String,
    pub normalized_address: String,
    /// Present only when the driver confirmed the number is registered
    pub registration: Option<NumberId>,
}

impl Contact {
    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn server(&self) -> Option<&str> {
        self.registration.as_ref().map(|r| r.server.as_str())
    }

    /// `user@server` address, when registered
    pub fn chat_id(&self) -> Option<String> {
        self.registration.as_ref().map(NumberId::chat_id)
    }
}

/// One selectable option of a button message
///
/// Options may carry nested options of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonSpec {
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<ButtonSpec>,
}

impl ButtonSpec {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            buttons: Vec::new(),
        }
    }

    fn validate(&self, path: &str) -> Result<()> {
        if self.body.trim().is_empty() {
            return Err(WhatsAppError::InvalidInput(format!(
                "{}.body must not be empty",
                path
            )));
        }
        for (i, child) in self.buttons.iter().enumerate() {
            child.validate(&format!("{}.buttons[{}]", path, i))?;
        }
        Ok(())
    }
}

/// Structured message with a list of reply options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMessage {
    pub title: String,
    pub body: String,
    pub footer: String,
    #[serde(default)]
    pub buttons: Vec<ButtonSpec>,
}

impl ButtonMessage {
    /// Rejects empty title/body/footer and empty option bodies
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("title", &self.title),
            ("body", &self.body),
            ("footer", &self.footer),
        ] {
            if value.trim().is_empty() {
                return Err(WhatsAppError::InvalidInput(format!(
                    "button.{} must not be empty",
                    name
                )));
            }
        }
        for (i, button) in self.buttons.iter().enumerate() {
            button.validate(&format!("button.buttons[{}]", i))?;
        }
        Ok(())
    }
}

/// Payload of the button-send operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendButtonMessageInput {
    pub contact: String,
    pub button: ButtonMessage,
}

impl SendButtonMessageInput {
    pub fn validate(&self) -> Result<()> {
        if self.contact.trim().is_empty() {
            return Err(WhatsAppError::InvalidInput(
                "contact must not be empty".to_string(),
            ));
        }
        self.button.validate()
    }
}

/// Wire-level result of a send, shared by both send endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub status: String,
}

/// Result of a button send
///
/// Failures are values here, not errors. [`ButtonOutcome::into_send_result`]
/// produces the legacy shape where the failure text is the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonOutcome {
    Sent { id: MessageId },
    Failed { reason: String },
}

impl ButtonOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ButtonOutcome::Sent { .. })
    }

    pub fn into_send_result(self) -> SendResult {
        match self {
            ButtonOutcome::Sent { id } => SendResult {
                id: Some(id),
                status: STATUS_BUTTON_SENT.to_string(),
            },
            ButtonOutcome::Failed { reason } => SendResult {
                id: None,
                status: reason,
            },
        }
    }
}
