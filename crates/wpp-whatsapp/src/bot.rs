//! WhatsApp bot wrapper
//!
//! Wires the credential store, the bridge driver and the session manager
//! together for the gateway binary.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;
use wpp_core::SessionConfig;

use crate::bridge::BridgeDriver;
use crate::credentials::prepare_credential_store;
use crate::dispatcher::MessageDispatcher;
use crate::driver::event_channel;
use crate::error::Result;
use crate::session::{ReconnectPolicy, SessionHandle, SessionManager};

/// WhatsApp bot wrapper
pub struct WhatsAppBot {
    config: SessionConfig,
    session: SessionHandle,
}

impl WhatsAppBot {
    /// Create a new WhatsApp bot; nothing connects until [`start`](Self::start)
    pub fn new(config: SessionConfig) -> Self {
        info!("WhatsApp client {} is being constructed", config.client_id);
        let session = SessionHandle::from_config(&config);
        Self { config, session }
    }

    /// Session handle shared with the HTTP layer
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    pub fn dispatcher(&self) -> MessageDispatcher {
        MessageDispatcher::new(self.session.clone())
    }

    /// Prepare the credential store, build the driver and run the session
    ///
    /// Fails with `CredentialStoreUnavailable` when the store cannot be used;
    /// the session then never gets a driver.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        info!(
            "Preparing credential store {} for client {}",
            self.config.credential_store, self.config.client_id
        );
        prepare_credential_store(&self.config.credential_store)?;

        let (tx, rx) = event_channel();
        let driver = Arc::new(BridgeDriver::new(&self.config, tx)?);
        let manager = SessionManager::attach(
            self.session.clone(),
            driver,
            rx,
            ReconnectPolicy::from_config(&self.config),
        )?;

        info!("WhatsApp client constructed; session manager starting");
        Ok(manager.spawn())
    }
}
