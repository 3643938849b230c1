//! wpp-whatsapp: WhatsApp session and message relay for wpp-gateway
//!
//! This crate owns the single WhatsApp session of the gateway: the
//! lifecycle state machine driven by driver events, recipient
//! normalization and lookup, text and button dispatch, and the
//! job-status integration that writes the delivery log.
//!
//! The messaging protocol itself lives behind [`WppDriver`]; the shipped
//! implementation is [`BridgeDriver`], which talks to an HTTP sidecar.

pub mod bot;
pub mod bridge;
pub mod contact;
pub mod credentials;
pub mod dispatcher;
pub mod driver;
pub mod error;
pub mod integration;
pub mod phone;
pub mod session;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bot::WhatsAppBot;
pub use bridge::BridgeDriver;
pub use contact::ContactResolver;
pub use dispatcher::MessageDispatcher;
pub use driver::{DriverEvent, WppDriver};
pub use error::{Result, WhatsAppError};
pub use integration::{DeliveryRecorder, JobStatusEvent, JobStatusOutcome};
pub use phone::{format_chat_id, normalize_phone_number};
pub use session::{ReconnectPolicy, SessionHandle, SessionManager, SessionSnapshot};
pub use types::{
    ButtonMessage, ButtonOutcome, ButtonSpec, Contact, NumberId, SendButtonMessageInput,
    SendResult, SessionState,
};
