//! Delivery log types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a single delivery attempt, persisted as `1` / `-1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

impl DeliveryOutcome {
    /// Numeric code stored in the `result` column
    pub fn code(self) -> i64 {
        match self {
            DeliveryOutcome::Success => 1,
            DeliveryOutcome::Failure => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(DeliveryOutcome::Success),
            -1 => Some(DeliveryOutcome::Failure),
            _ => None,
        }
    }
}

/// One row of the delivery log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLogRecord {
    /// Row id, assigned by the store
    pub id: Option<i64>,
    /// Normalized contact the message was addressed to
    pub contact: String,
    /// Message body that was (or would have been) sent
    pub sent_message: String,
    pub outcome: DeliveryOutcome,
    /// Human readable outcome or failure reason
    pub result_message: String,
    pub date: DateTime<Utc>,
}

impl DeliveryLogRecord {
    pub fn new(
        contact: impl Into<String>,
        sent_message: impl Into<String>,
        outcome: DeliveryOutcome,
        result_message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            contact: contact.into(),
            sent_message: sent_message.into(),
            outcome,
            result_message: result_message.into(),
            date: Utc::now(),
        }
    }

    pub fn success(
        contact: impl Into<String>,
        sent_message: impl Into<String>,
        result_message: impl Into<String>,
    ) -> Self {
        Self::new(contact, sent_message, DeliveryOutcome::Success, result_message)
    }

    pub fn failure(
        contact: impl Into<String>,
        sent_message: impl Into<String>,
        result_message: impl Into<String>,
    ) -> Self {
        Self::new(contact, sent_message, DeliveryOutcome::Failure, result_message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes() {
        assert_eq!(DeliveryOutcome::Success.code(), 1);
        assert_eq!(DeliveryOutcome::Failure.code(), -1);
        assert_eq!(DeliveryOutcome::from_code(1), Some(DeliveryOutcome::Success));
        assert_eq!(DeliveryOutcome::from_code(-1), Some(DeliveryOutcome::Failure));
        assert_eq!(DeliveryOutcome::from_code(0), None);
    }

    #[test]
    fn test_failure_record() {
        let record = DeliveryLogRecord::failure("5511999999999", "hello", "API not connected");
        assert!(record.id.is_none());
        assert_eq!(record.outcome, DeliveryOutcome::Failure);
        assert_eq!(record.result_message, "API not connected");
    }
}
