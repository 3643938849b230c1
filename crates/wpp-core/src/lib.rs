//! wpp-core: WhatsApp Relay Gateway Core Library
//!
//! 設定の読み込み、共通エラー型、配信ログ (delivery log) の
//! SQLite 永続化を提供します。

pub mod config;
pub mod delivery;
pub mod error;

pub use config::{ApiConfig, Config, CredentialStore, DeliveryConfig, SessionConfig};
pub use delivery::{DeliveryLogRecord, DeliveryOutcome, DeliveryStore};
pub use error::{Error, Result};
