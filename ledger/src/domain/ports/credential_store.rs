//! Driven port persisting the long-lived API credential.

use chrono::{DateTime, Utc};
use zeroize::Zeroizing;

use super::define_port_error;

/// Long-lived credential with its owner and scope metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    /// Long-lived refresh credential.
    pub refresh_token: Zeroizing<String>,
    /// Owner identifier, when known.
    pub athlete_id: Option<i64>,
    /// Granted scope, when known.
    pub scope: Option<String>,
    /// When the credential was written.
    pub saved_at: DateTime<Utc>,
}

define_port_error! {
    /// Errors raised while persisting credentials.
    pub enum CredentialStoreError {
        /// Writing the credential document failed.
        Write { path: String, message: String } =>
            "failed to persist credential at {path}: {message}",
    }
}

/// Single-slot credential store, overwritten on each rotation.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential. Missing or unreadable stores read as `None`.
    fn load(&self) -> Option<StoredCredential>;

    /// Replace the stored credential.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialStoreError::Write`] when the document cannot be
    /// written durably.
    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialStoreError>;
}
