//! Delivery log
//!
//! Append-only record of outbound attempts made on behalf of the
//! job-status webhook.

pub mod store;
pub mod types;

pub use store::DeliveryStore;
pub use types::{DeliveryLogRecord, DeliveryOutcome};
