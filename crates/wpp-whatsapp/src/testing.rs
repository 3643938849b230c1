//! In-process driver double for tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use wpp_core::CredentialStore;

use crate::driver::{DriverEvent, WppDriver, event_channel};
use crate::error::{Result, WhatsAppError};
use crate::session::{ReconnectPolicy, SessionHandle, SessionManager};
use crate::types::{ButtonMessage, MessageId, NumberId};

/// Scriptable [`WppDriver`] that records every call
#[derive(Default)]
pub struct FakeDriver {
    registered: Mutex<HashMap<String, NumberId>>,
    initialize_failures: AtomicUsize,
    lookup_error: AtomicBool,
    send_error: Mutex<Option<String>>,
    hang: AtomicBool,
    next_id: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
    pub init_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    pub send_calls: AtomicUsize,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark bare digits as registered on `c.us`
    pub fn register(&self, digits: &str) {
        self.registered.lock().unwrap().insert(
            digits.to_string(),
            NumberId {
                user: digits.to_string(),
                server: "c.us".to_string(),
            },
        );
    }

    pub fn fail_initialize_times(&self, times: usize) {
        self.initialize_failures.store(times, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self) {
        self.lookup_error.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, reason: &str) {
        *self.send_error.lock().unwrap() = Some(reason.to_string());
    }

    /// Every call after this never completes
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// `(chat_id, body)` of each accepted send
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn record_send(&self, chat_id: &str, body: &str) -> Result<MessageId> {
        if let Some(reason) = self.send_error.lock().unwrap().clone() {
            return Err(WhatsAppError::Driver(reason));
        }
        self.sent
            .lock()
            .unwrap()
            .push((chat_id.to_string(), body.to_string()));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("true_{}_{:04}", chat_id, n))
    }
}

#[async_trait]
impl WppDriver for FakeDriver {
    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang().await;
        let remaining = self.initialize_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.initialize_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(WhatsAppError::Driver("browser failed to start".to_string()));
        }
        Ok(())
    }

    async fn number_id(&self, address: &str) -> Result<Option<NumberId>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang().await;
        if self.lookup_error.load(Ordering::SeqCst) {
            return Err(WhatsAppError::Driver("evaluation failed".to_string()));
        }
        Ok(self.registered.lock().unwrap().get(address).cloned())
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<MessageId> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang().await;
        self.record_send(chat_id, body)
    }

    async fn send_buttons(&self, chat_id: &str, message: &ButtonMessage) -> Result<MessageId> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_hang().await;
        self.record_send(chat_id, &message.body)
    }
}

/// Session backed by `driver`, already moved to `Ready` when `ready` is set
pub async fn session_with(driver: Arc<FakeDriver>, ready: bool) -> SessionHandle {
    let handle = SessionHandle::new(
        "test-client",
        CredentialStore::Local(std::env::temp_dir().join("wpp-gateway-test")),
        Duration::from_millis(200),
    );
    let (_tx, rx) = event_channel();
    let mut manager = SessionManager::attach(
        handle.clone(),
        driver,
        rx,
        ReconnectPolicy::default(),
    )
    .unwrap();
    if ready {
        manager.apply(DriverEvent::Ready).await;
    }
    handle
}
