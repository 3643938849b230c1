//! Credential store preparation
//!
//! The driver persists session material itself; the gateway only makes
//! sure the configured location is usable before the driver is built.

use tracing::info;
use wpp_core::CredentialStore;

use crate::error::{Result, WhatsAppError};

/// Check that the credential store can be used
pub fn prepare_credential_store(store: &CredentialStore) -> Result<()> {
    match store {
        CredentialStore::Local(path) => {
            std::fs::create_dir_all(path).map_err(|e| {
                WhatsAppError::CredentialStoreUnavailable(format!(
                    "cannot create {}: {}",
                    path.display(),
                    e
                ))
            })?;
            info!("Using local credential store at {}", path.display());
        }
        CredentialStore::Remote(url) => {
            let parsed = reqwest::Url::parse(url).map_err(|e| {
                WhatsAppError::CredentialStoreUnavailable(format!(
                    "invalid remote store url: {}",
                    e
                ))
            })?;
            if parsed.host_str().is_none() {
                return Err(WhatsAppError::CredentialStoreUnavailable(
                    "remote store url has no host".to_string(),
                ));
            }
            info!("Using remote credential store ({})", parsed.scheme());
        }
    }
    Ok(())
}
