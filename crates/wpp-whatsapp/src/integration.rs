//! Job-status webhook integration
//!
//! An external job system reports status changes. Events with status
//! [`DELIVERY_STATUS_ID`] trigger a text message to the job's client, and
//! every such attempt is written to the delivery log.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, error, info, warn};
use wpp_core::{DeliveryLogRecord, DeliveryOutcome, DeliveryStore};

use crate::dispatcher::MessageDispatcher;
use crate::phone::normalize_phone_number;

/// Status that asks the gateway to notify the client
pub const DELIVERY_STATUS_ID: i64 = 800;

/// Failure message logged when the session cannot send
pub const NOT_CONNECTED_MESSAGE: &str = "API not connected";

/// Body posted by the job system
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusEvent {
    #[serde(rename = "StatusId")]
    pub status_id: i64,
    #[serde(rename = "Cliente", default)]
    pub client: Option<JobClient>,
    /// Message text to send to the client
    #[serde(rename = "SmsProfissionalCaminho", default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobClient {
    #[serde(rename = "Telefone", default)]
    pub phone: Option<String>,
}

impl JobStatusEvent {
    pub fn phone(&self) -> Option<&str> {
        self.client
            .as_ref()
            .and_then(|c| c.phone.as_deref())
            .filter(|p| !p.trim().is_empty())
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().filter(|m| !m.trim().is_empty())
    }
}

/// What the recorder did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatusOutcome {
    /// Not a delivery status; nothing sent, nothing logged
    Ignored,
    /// A delivery log row was written (or attempted) with this outcome
    Recorded(DeliveryOutcome),
}

/// Sends job notifications and writes the delivery log
#[derive(Clone)]
pub struct DeliveryRecorder {
    dispatcher: MessageDispatcher,
    store: Arc<DeliveryStore>,
}

impl DeliveryRecorder {
    pub fn new(dispatcher: MessageDispatcher, store: Arc<DeliveryStore>) -> Self {
        Self { dispatcher, store }
    }

    pub fn store(&self) -> &Arc<DeliveryStore> {
        &self.store
    }

    /// Handle one job-status event
    ///
    /// Never fails: the outcome is only observable through the delivery log.
    pub async fn on_job_status(&self, event: &JobStatusEvent) -> JobStatusOutcome {
        if event.status_id != DELIVERY_STATUS_ID {
            debug!("Ignoring job status {}", event.status_id);
            return JobStatusOutcome::Ignored;
        }

        let contact = event.phone().map(normalize_phone_number).unwrap_or_default();
        let message = event.message().unwrap_or_default().to_string();

        let record = if contact.is_empty() || message.is_empty() {
            warn!("Job status event without phone or message");
            DeliveryLogRecord::failure(
                contact,
                message,
                "Invalid payload: Cliente.Telefone and SmsProfissionalCaminho are required",
            )
        } else if !self.dispatcher.session().is_ready() {
            warn!("Job notification for {} skipped: session not ready", contact);
            DeliveryLogRecord::failure(contact, message, NOT_CONNECTED_MESSAGE)
        } else {
            match self.dispatcher.send_text(&contact, &message).await {
                Ok(result) => {
                    info!("Job notification sent to {}", contact);
                    DeliveryLogRecord::success(contact, message, result.status)
                }
                Err(e) => {
                    error!("Job notification to {} failed: {}", contact, e);
                    DeliveryLogRecord::failure(contact, message, e.to_string())
                }
            }
        };

        let outcome = record.outcome;
        if let Err(e) = self.store.append(&record) {
            error!("Failed to write delivery log: {}", e);
        }
        JobStatusOutcome::Recorded(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDriver, session_with};
    use std::sync::atomic::Ordering;

    fn event(status_id: i64, phone: &str, message: &str) -> JobStatusEvent {
        serde_json::from_value(serde_json::json!({
            "StatusId": status_id,
            "Cliente": { "Telefone": phone, "Nome": "Maria" },
            "SmsProfissionalCaminho": message,
        }))
        .unwrap()
    }

    async fn recorder(driver: Arc<FakeDriver>, ready: bool) -> DeliveryRecorder {
        let session = session_with(driver, ready).await;
        let store = Arc::new(DeliveryStore::in_memory().unwrap());
        DeliveryRecorder::new(MessageDispatcher::new(session), store)
    }

    #[tokio::test]
    async fn test_other_status_is_ignored() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let recorder = recorder(driver.clone(), true).await;

        let outcome = recorder.on_job_status(&event(700, "11999999999", "a caminho")).await;

        assert_eq!(outcome, JobStatusOutcome::Ignored);
        assert_eq!(recorder.store().count().unwrap(), 0);
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_ready_logs_without_sending() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let recorder = recorder(driver.clone(), false).await;

        let outcome = recorder
            .on_job_status(&event(800, "(11) 99999-9999", "Profissional a caminho"))
            .await;

        assert_eq!(outcome, JobStatusOutcome::Recorded(DeliveryOutcome::Failure));
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
        let rows = recorder.store().recent(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contact, "5511999999999");
        assert_eq!(rows[0].outcome.code(), -1);
        assert_eq!(rows[0].result_message, "API not connected");
    }

    #[tokio::test]
    async fn test_successful_delivery_is_logged() {
        let driver = Arc::new(FakeDriver::new());
        driver.register("5511999999999");
        let recorder = recorder(driver.clone(), true).await;

        let outcome = recorder
            .on_job_status(&event(800, "11999999999", "Profissional a caminho"))
            .await;

        assert_eq!(outcome, JobStatusOutcome::Recorded(DeliveryOutcome::Success));
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 1);
        let rows = recorder.store().recent(10).unwrap();
        assert_eq!(rows[0].outcome.code(), 1);
        assert_eq!(rows[0].sent_message, "Profissional a caminho");
    }

    #[tokio::test]
    async fn test_unregistered_contact_is_logged_as_failure() {
        let driver = Arc::new(FakeDriver::new());
        let recorder = recorder(driver.clone(), true).await;

        let outcome = recorder.on_job_status(&event(800, "11888888888", "oi")).await;

        assert_eq!(outcome, JobStatusOutcome::Recorded(DeliveryOutcome::Failure));
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
        let rows = recorder.store().recent(10).unwrap();
        assert!(rows[0].result_message.contains("not registered"));
    }

    #[tokio::test]
    async fn test_missing_phone_is_logged_as_failure() {
        let driver = Arc::new(FakeDriver::new());
        let recorder = recorder(driver.clone(), true).await;
        let event: JobStatusEvent =
            serde_json::from_str(r#"{"StatusId": 800, "SmsProfissionalCaminho": "oi"}"#).unwrap();

        let outcome = recorder.on_job_status(&event).await;

        assert_eq!(outcome, JobStatusOutcome::Recorded(DeliveryOutcome::Failure));
        assert_eq!(driver.send_calls.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.store().count().unwrap(), 1);
    }
}
