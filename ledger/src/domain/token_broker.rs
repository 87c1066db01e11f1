//! Exchanges the stored long-lived credential for an access credential.
//!
//! The token endpoint may rotate the long-lived credential on any exchange.
//! A rotated credential is written to the store before the access credential
//! is handed out, so a crash never strands the only valid credential in
//! memory.

use std::sync::Arc;

use mockable::Clock;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::domain::PipelineError;
use crate::domain::ports::{
    ClientCredentials, CredentialStore, StoredCredential, StravaApi, StravaApiError,
};
use crate::domain::rate_budget::BudgetSnapshot;

/// Access credential for one run plus the owner it belongs to.
#[derive(Debug, Clone)]
pub struct AuthorizedSession {
    /// Short-lived bearer credential.
    pub access_token: Zeroizing<String>,
    /// Owner identifier, when known from the grant or the store.
    pub athlete_id: Option<i64>,
}

/// Loads, refreshes, and persists API credentials.
pub struct TokenBroker {
    api: Arc<dyn StravaApi>,
    store: Arc<dyn CredentialStore>,
    credentials: Option<ClientCredentials>,
    bootstrap: Option<Zeroizing<String>>,
    clock: Arc<dyn Clock>,
}

impl TokenBroker {
    /// Build a broker. `bootstrap` is used only when the store is empty.
    pub fn new(
        api: Arc<dyn StravaApi>,
        store: Arc<dyn CredentialStore>,
        credentials: Option<ClientCredentials>,
        bootstrap: Option<Zeroizing<String>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            store,
            credentials,
            bootstrap,
            clock,
        }
    }

    /// Exchange the long-lived credential for an access credential.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when client credentials or the
    /// long-lived credential are missing, [`PipelineError::Authorization`]
    /// when the endpoint rejects them, [`PipelineError::Storage`] when a
    /// rotated credential cannot be saved, and
    /// [`PipelineError::TransientHttp`] for any other endpoint failure.
    pub async fn authorize(&self) -> Result<AuthorizedSession, PipelineError> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            PipelineError::configuration("STRAVA_CLIENT_ID and STRAVA_CLIENT_SECRET must be set")
        })?;
        let stored = self.store.load();
        let refresh_token = stored
            .as_ref()
            .map(|credential| credential.refresh_token.clone())
            .or_else(|| self.bootstrap.clone())
            .ok_or_else(|| {
                PipelineError::configuration(
                    "no stored credential and STRAVA_REFRESH_TOKEN is not set",
                )
            })?;

        let grant = self
            .api
            .refresh_access_token(credentials, &refresh_token)
            .await
            .map_err(map_refresh_error)?;

        let athlete_id = grant
            .athlete_id
            .or_else(|| stored.as_ref().and_then(|credential| credential.athlete_id));
        let rotated = grant
            .refresh_token
            .as_ref()
            .filter(|token| token.as_str() != refresh_token.as_str());
        if stored.is_none() || rotated.is_some() {
            let credential = StoredCredential {
                refresh_token: rotated.cloned().unwrap_or(refresh_token),
                athlete_id,
                scope: grant
                    .scope
                    .clone()
                    .or_else(|| stored.as_ref().and_then(|credential| credential.scope.clone())),
                saved_at: self.clock.utc(),
            };
            self.store
                .save(&credential)
                .map_err(|error| PipelineError::storage(error.to_string()))?;
            if rotated.is_some() {
                info!(athlete_id = ?athlete_id, "persisted rotated refresh credential");
            }
        }
        debug!(athlete_id = ?athlete_id, "access credential obtained");

        Ok(AuthorizedSession {
            access_token: grant.access_token,
            athlete_id,
        })
    }
}

fn map_refresh_error(error: StravaApiError) -> PipelineError {
    match error {
        StravaApiError::Unauthorized { status, message } => {
            PipelineError::authorization(status, message)
        }
        StravaApiError::Status {
            status, message, ..
        } => PipelineError::transient_http(
            "token refresh",
            status,
            message,
            BudgetSnapshot::default(),
        ),
        other => PipelineError::transient_http(
            "token refresh",
            None::<u16>,
            other.to_string(),
            BudgetSnapshot::default(),
        ),
    }
}
