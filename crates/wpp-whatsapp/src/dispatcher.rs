//! Outbound message dispatch

use tracing::{error, info};

use crate::contact::ContactResolver;
use crate::driver::with_deadline;
use crate::error::{Result, WhatsAppError};
use crate::phone::format_chat_id;
use crate::session::SessionHandle;
use crate::types::{ButtonOutcome, SendButtonMessageInput, SendResult, STATUS_OK};

/// Sends text and button messages through the session's driver
#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    session: SessionHandle,
    resolver: ContactResolver,
}

impl MessageDispatcher {
    pub fn new(session: SessionHandle) -> Self {
        let resolver = ContactResolver::new(session.clone());
        Self { session, resolver }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Send a text message to a registered contact
    ///
    /// The session must be ready, and the contact must be registered; an
    /// unregistered contact never reaches the driver's send.
    pub async fn send_text(&self, contact: &str, body: &str) -> Result<SendResult> {
        info!("Send message is initialized");

        if contact.trim().is_empty() {
            return Err(WhatsAppError::InvalidInput(
                "contact must not be empty".to_string(),
            ));
        }
        if body.trim().is_empty() {
            return Err(WhatsAppError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let driver = self.session.ready_driver()?;

        let resolved = self.resolver.resolve(contact).await?;
        let Some(chat_id) = resolved.chat_id() else {
            return Err(WhatsAppError::ContactNotRegistered(
                resolved.normalized_address,
            ));
        };

        info!("Contact is registered: {}", chat_id);

        let id = with_deadline(self.session.driver_timeout(), driver.send_text(&chat_id, body))
            .await?;

        Ok(SendResult {
            id: Some(id),
            status: STATUS_OK.to_string(),
        })
    }

    /// Send a button message
    ///
    /// No registration lookup is done on this path. Failures are returned as
    /// [`ButtonOutcome::Failed`], never as an error.
    pub async fn send_button_message(&self, input: &SendButtonMessageInput) -> ButtonOutcome {
        info!("Send button message is initialized");

        let outcome = match self.try_send_buttons(input).await {
            Ok(id) => ButtonOutcome::Sent { id },
            Err(e) => {
                error!("Send button message to {} failed: {}", input.contact, e);
                ButtonOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        info!("Send button message is finished");
        outcome
    }

    async fn try_send_buttons(&self, input: &SendButtonMessageInput) -> Result<String> {
        input.validate()?;
        let driver = self.session.ready_driver()?;
        let chat_id = format_chat_id(&input.contact);
        with_deadline(
            self.session.driver_timeout(),
            driver.send_buttons(&chat_id, &input.button),
        )
        .await
    }
}
