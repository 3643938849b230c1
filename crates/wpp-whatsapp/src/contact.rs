//! Contact resolution

use tracing::{debug, warn};

use crate::driver::with_deadline;
use crate::error::Result;
use crate::phone::normalize_phone_number;
use crate::session::SessionHandle;
use crate::types::Contact;

/// Looks up whether a number is a registered WhatsApp account
#[derive(Debug, Clone)]
pub struct ContactResolver {
    session: SessionHandle,
}

impl ContactResolver {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    /// Normalize `raw` and ask the driver for its registration record
    ///
    /// A failing or timed out lookup is reported as unregistered, so an
    /// unverified address is never sent to. Only a missing driver is an error.
    pub async fn resolve(&self, raw: &str) -> Result<Contact> {
        let driver = self.session.driver()?;
        let normalized = normalize_phone_number(raw);

        let registration = if normalized.is_empty() {
            None
        } else {
            match with_deadline(self.session.driver_timeout(), driver.number_id(&normalized)).await
            {
                Ok(registration) => registration,
                Err(e) => {
                    warn!("Number lookup for {} failed, treating as unregistered: {}", normalized, e);
                    None
                }
            }
        };

        debug!(
            "Resolved {} -> {} (registered: {})",
            raw,
            normalized,
            registration.is_some()
        );

        Ok(Contact {
            raw_input: raw.to_string(),
            normalized_address: normalized,
            registration,
        })
    }
}
