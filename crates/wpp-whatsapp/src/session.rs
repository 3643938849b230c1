//! Session lifecycle
//!
//! [`SessionManager`] is the only writer of session state. It consumes
//! [`DriverEvent`]s one at a time and publishes a [`SessionSnapshot`]
//! through a `watch` channel. Everything else reads the snapshot through a
//! cloneable [`SessionHandle`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wpp_core::{CredentialStore, SessionConfig};

use crate::driver::{DriverEvent, DriverEventReceiver, WppDriver, with_deadline};
use crate::error::{Result, WhatsAppError};
use crate::types::SessionState;

/// Point-in-time view of the session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Pending pairing code, only while waiting for a scan
    pub qr_code: Option<String>,
    /// Reason of the last authentication failure
    pub auth_failure: Option<String>,
}

struct SessionShared {
    client_id: String,
    credential_store: CredentialStore,
    driver_timeout: Duration,
    driver: OnceLock<Arc<dyn WppDriver>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

/// Read access to the process-wide session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionShared>,
}

impl SessionHandle {
    pub fn new(
        client_id: impl Into<String>,
        credential_store: CredentialStore,
        driver_timeout: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(SessionShared {
                client_id: client_id.into(),
                credential_store,
                driver_timeout,
                driver: OnceLock::new(),
                snapshot,
            }),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.client_id.clone(),
            config.credential_store.clone(),
            config.driver_timeout(),
        )
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Deadline applied to every driver call
    pub fn driver_timeout(&self) -> Duration {
        self.inner.driver_timeout
    }

    /// The attached driver, or `DriverUnavailable` during early bootstrap
    pub fn driver(&self) -> Result<Arc<dyn WppDriver>> {
        self.inner
            .driver
            .get()
            .cloned()
            .ok_or(WhatsAppError::DriverUnavailable)
    }

    /// The driver, only when the session is ready to send
    pub fn ready_driver(&self) -> Result<Arc<dyn WppDriver>> {
        let driver = self.driver()?;
        let snapshot = self.inner.snapshot.borrow().clone();
        match snapshot.state {
            SessionState::Ready => Ok(driver),
            SessionState::AuthFailed => Err(WhatsAppError::AuthFailure(
                snapshot.auth_failure.unwrap_or_default(),
            )),
            _ => Err(WhatsAppError::SessionNotReady),
        }
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.driver()?;
        Ok(self.inner.snapshot.borrow().clone())
    }

    /// Current state, `None` before the first initialization
    pub fn state(&self) -> Result<Option<SessionState>> {
        let state = self.snapshot()?.state;
        Ok((state != SessionState::Uninitialized).then_some(state))
    }

    /// Pending pairing code, if any
    pub fn qr_code(&self) -> Result<Option<String>> {
        Ok(self.snapshot()?.qr_code)
    }

    fn snapshot_state(&self) -> SessionState {
        self.inner.snapshot.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.inner.driver.get().is_some()
            && self.inner.snapshot.borrow().state == SessionState::Ready
    }

    /// Receiver that is notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    fn attach(&self, driver: Arc<dyn WppDriver>) -> Result<()> {
        self.inner
            .driver
            .set(driver)
            .map_err(|_| WhatsAppError::Driver("a driver is already attached".to_string()))
    }

    fn update(&self, f: impl FnOnce(&mut SessionSnapshot)) {
        self.inner.snapshot.send_modify(f);
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("client_id", &self.inner.client_id)
            .field("credential_store", &self.inner.credential_store.to_string())
            .field("snapshot", &*self.inner.snapshot.borrow())
            .finish()
    }
}

/// Reconnection policy applied after a disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            initial: config.reconnect_initial(),
            max: config.reconnect_max(),
            max_attempts: config.reconnect_max_attempts,
        }
    }
}

/// Exponential backoff state for one outage
///
/// The first attempt is immediate, then `initial`, `2 * initial`, ...
/// capped at `max`.
#[derive(Debug)]
struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max_attempts) = self.policy.max_attempts {
            if self.attempts >= max_attempts {
                return None;
            }
        }

        let delay = if self.attempts == 0 {
            Duration::ZERO
        } else {
            let factor = 1u32.checked_shl(self.attempts - 1).unwrap_or(u32::MAX);
            self.policy.initial.saturating_mul(factor).min(self.policy.max)
        };
        self.attempts += 1;
        Some(delay)
    }

    fn reset(&mut self) {
        self.attempts = 0;
    }
}

/// Single writer of session state
pub struct SessionManager {
    handle: SessionHandle,
    driver: Arc<dyn WppDriver>,
    events: DriverEventReceiver,
    backoff: Backoff,
}

impl SessionManager {
    /// Attach a driver to the session
    ///
    /// Fails when the session already has a driver.
    pub fn attach(
        handle: SessionHandle,
        driver: Arc<dyn WppDriver>,
        events: DriverEventReceiver,
        policy: ReconnectPolicy,
    ) -> Result<Self> {
        handle.attach(Arc::clone(&driver))?;
        Ok(Self {
            handle,
            driver,
            events,
            backoff: Backoff::new(policy),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Initialize the driver, then apply events until the driver goes away
    pub async fn run(mut self) {
        info!(
            "WhatsApp session {} is initializing",
            self.handle.client_id()
        );
        if let Err(e) = self.initialize().await {
            error!("Initial driver initialization failed: {}", e);
            self.reconnect().await;
        }

        while let Some(event) = self.events.recv().await {
            self.apply(event).await;
        }

        warn!("Driver event channel closed; session manager stopped");
    }

    /// Apply one driver event
    pub async fn apply(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Qr(code) => {
                info!("Pairing QR code issued");
                self.handle.update(|s| {
                    s.state = SessionState::QrPending;
                    s.qr_code = Some(code);
                });
            }
            DriverEvent::Authenticated => {
                info!("WhatsApp session authenticated");
            }
            DriverEvent::Ready => {
                info!("WhatsApp session ready to send and receive messages");
                self.backoff.reset();
                self.handle.update(|s| {
                    s.state = SessionState::Ready;
                    s.qr_code = None;
                    s.auth_failure = None;
                });
            }
            DriverEvent::AuthFailure(reason) => {
                error!(
                    "WhatsApp authentication failed: {}. Restart the gateway or re-provision credentials",
                    reason
                );
                self.handle.update(|s| {
                    s.state = SessionState::AuthFailed;
                    s.qr_code = None;
                    s.auth_failure = Some(reason);
                });
            }
            DriverEvent::Disconnected(reason)
                if self.handle.snapshot_state() == SessionState::AuthFailed =>
            {
                warn!(
                    "WhatsApp session disconnected after an authentication failure ({}); not reconnecting",
                    reason
                );
            }
            DriverEvent::Disconnected(reason) => {
                warn!("WhatsApp session disconnected: {}", reason);
                self.handle.update(|s| {
                    s.state = SessionState::Disconnected;
                    s.qr_code = None;
                });
                self.reconnect().await;
            }
            DriverEvent::SessionSaved => {
                info!("Session saved by the credential store");
            }
            DriverEvent::Loading { percent, message } => {
                debug!("Loading {}% {}", percent, message);
            }
            DriverEvent::MessageAck { id, ack } => {
                debug!("Message {} acknowledged with level {}", id, ack);
            }
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        self.handle.update(|s| s.state = SessionState::Initializing);
        let deadline = self.handle.driver_timeout();
        with_deadline(deadline, self.driver.initialize()).await
    }

    /// Re-initialize with backoff until one attempt is accepted by the driver
    async fn reconnect(&mut self) {
        loop {
            let Some(delay) = self.backoff.next_delay() else {
                error!(
                    "Giving up on reconnecting after {} attempts",
                    self.backoff.attempts
                );
                self.handle.update(|s| s.state = SessionState::Disconnected);
                return;
            };

            if !delay.is_zero() {
                info!(
                    "Reconnecting in {:?} (attempt {})",
                    delay, self.backoff.attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.initialize().await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Reinitialization attempt {} failed: {}", self.backoff.attempts, e);
                    self.handle.update(|s| s.state = SessionState::Disconnected);
                }
            }
        }
    }
}
