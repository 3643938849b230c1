//! HTTP bridge driver
//!
//! Talks to a sidecar process that hosts the actual WhatsApp Web client.
//! The sidecar keeps the browser session and credential store; this driver
//! starts it, forwards sends and lookups, and polls its event feed.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use wpp_core::{CredentialStore, SessionConfig};

use crate::driver::{DriverEvent, DriverEventSender, WppDriver};
use crate::error::{Result, WhatsAppError};
use crate::types::{ButtonMessage, MessageId, NumberId};

/// Messaging bridge client
pub struct BridgeDriver {
    client: Client,
    base_url: String,
    client_id: String,
    credential_store: CredentialStore,
    backup_sync_interval: Duration,
    poll_interval: Duration,
    events: DriverEventSender,
    poller: Mutex<Option<JoinHandle<()>>>,
}

/// Event feed page; items are decoded one by one so a single unknown
/// event cannot stall the feed
#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<serde_json::Value>,
}

/// Reply to `/start`: the last sequence number the sidecar has issued
#[derive(Debug, Default, Deserialize)]
struct StartResponse {
    #[serde(default)]
    seq: u64,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

impl BridgeDriver {
    /// Create a new bridge driver that reports events on `events`
    pub fn new(config: &SessionConfig, events: DriverEventSender) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.driver_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.bridge_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            credential_store: config.credential_store.clone(),
            backup_sync_interval: Duration::from_secs(config.backup_sync_interval_secs),
            poll_interval: config.event_poll_interval(),
            events,
            poller: Mutex::new(None),
        })
    }

    fn session_url(&self, path: &str) -> String {
        format!("{}/sessions/{}{}", self.base_url, self.client_id, path)
    }

    fn start_payload(&self) -> serde_json::Value {
        let auth = match &self.credential_store {
            CredentialStore::Local(path) => serde_json::json!({
                "strategy": "local",
                "dataPath": path.display().to_string(),
            }),
            CredentialStore::Remote(url) => serde_json::json!({
                "strategy": "remote",
                "storeUrl": url,
                "backupSyncIntervalMs": self.backup_sync_interval.as_millis() as u64,
            }),
        };
        serde_json::json!({ "clientId": self.client_id, "auth": auth })
    }

    /// Replace the event poller with one reading events after `after`
    ///
    /// Called on every successful start, since a restarted sidecar numbers
    /// its events from scratch.
    fn restart_poller(&self, after: u64) {
        let Ok(mut poller) = self.poller.lock() else {
            error!("Bridge poller lock poisoned");
            return;
        };
        if let Some(task) = poller.take() {
            task.abort();
        }

        let client = self.client.clone();
        let url = self.session_url("/events");
        let events = self.events.clone();
        let interval = self.poll_interval;

        *poller = Some(tokio::spawn(poll_events(
            client, url, events, interval, after,
        )));
    }

    async fn post_message(&self, body: serde_json::Value) -> Result<MessageId> {
        let response = self
            .client
            .post(self.session_url("/messages"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Driver(format!(
                "Failed to send message: {} - {}",
                status, text
            )));
        }

        let sent: SendResponse = response.json().await?;
        Ok(sent.id)
    }
}

impl Drop for BridgeDriver {
    fn drop(&mut self) {
        if let Ok(mut poller) = self.poller.lock() {
            if let Some(task) = poller.take() {
                task.abort();
            }
        }
    }
}

/// Decode one feed item into its sequence number and event
///
/// Items are `{seq, event: {type, data}}`; a flat `{seq, type, data}` is
/// accepted too. The event is `None` when its type is unknown.
fn decode_item(item: &serde_json::Value) -> Option<(u64, Option<DriverEvent>)> {
    let seq = item.get("seq")?.as_u64()?;
    let mut event = item.get("event").unwrap_or(item).clone();

    let decoded = match serde_json::from_value::<DriverEvent>(event.clone()) {
        Ok(decoded) => Some(decoded),
        // Reason-carrying events may arrive without a reason
        Err(_) if event.get("data").is_none() && event.is_object() => {
            event["data"] = serde_json::Value::String(String::new());
            serde_json::from_value(event).ok()
        }
        Err(_) => None,
    };
    Some((seq, decoded))
}

async fn poll_events(
    client: Client,
    url: String,
    events: DriverEventSender,
    interval: Duration,
    mut after: u64,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        ticker.tick().await;

        let response = match client
            .get(&url)
            .query(&[("after", after)])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                warn!("Bridge event poll returned {}", response.status());
                continue;
            }
            Err(e) => {
                debug!("Bridge event poll failed: {}", e);
                continue;
            }
        };

        let batch: EventsResponse = match response.json().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Unparseable bridge events: {}", e);
                continue;
            }
        };

        for item in batch.events {
            let Some((seq, event)) = decode_item(&item) else {
                warn!("Bridge event without a sequence number: {}", item);
                continue;
            };
            if seq <= after {
                continue;
            }
            after = seq;

            let Some(event) = event else {
                warn!("Skipping unknown bridge event {}: {}", seq, item);
                continue;
            };
            if events.send(event).await.is_err() {
                info!("Session manager is gone; stopping bridge event poll");
                return;
            }
        }
    }
}

#[async_trait]
impl WppDriver for BridgeDriver {
    async fn initialize(&self) -> Result<()> {
        info!("Starting bridge session {}", self.client_id);

        let response = self
            .client
            .post(self.session_url("/start"))
            .json(&self.start_payload())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(WhatsAppError::Driver(format!(
                "Failed to start session: {} - {}",
                status, text
            )));
        }

        let started: StartResponse = response.json().await.unwrap_or_default();
        debug!("Bridge session started at event {}", started.seq);
        self.restart_poller(started.seq);
        Ok(())
    }

    async fn number_id(&self, address: &str) -> Result<Option<NumberId>> {
        let response = self
            .client
            .get(self.session_url(&format!("/number-id/{}", address)))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(response.json::<Option<NumberId>>().await?),
            status => {
                let text = response.text().await.unwrap_or_default();
                Err(WhatsAppError::Driver(format!(
                    "Number lookup failed: {} - {}",
                    status, text
                )))
            }
        }
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<MessageId> {
        debug!("Sending text message to {}", chat_id);
        self.post_message(serde_json::json!({
            "chatId": chat_id,
            "type": "text",
            "body": body,
        }))
        .await
    }

    async fn send_buttons(&self, chat_id: &str, message: &ButtonMessage) -> Result<MessageId> {
        debug!("Sending button message to {}", chat_id);
        self.post_message(serde_json::json!({
            "chatId": chat_id,
            "type": "buttons",
            "buttons": message,
        }))
        .await
    }
}
