//! Driven port for the Strava REST API.
//!
//! The domain owns the request and response shapes; the adapter owns HTTP,
//! header parsing, and status mapping. Every successful response carries the
//! rate report so callers can keep their budget current.

use async_trait::async_trait;
use serde_json::Value;
use zeroize::Zeroizing;

use super::define_port_error;
use crate::domain::rate_budget::RateReport;

/// OAuth client identity used at the token endpoint.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// Application client identifier.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: Zeroizing<String>,
}

/// Result of exchanging a long-lived credential.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// Short-lived bearer credential.
    pub access_token: Zeroizing<String>,
    /// Long-lived credential returned by the endpoint, possibly rotated.
    pub refresh_token: Option<Zeroizing<String>>,
    /// Owner identifier when the response includes it.
    pub athlete_id: Option<i64>,
    /// Granted scope when the response includes it.
    pub scope: Option<String>,
}

/// One page of the activity list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityPageQuery {
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub per_page: u32,
    /// Only return activities starting after this unix time.
    pub after: Option<i64>,
}

/// Decoded body plus the rate report from its response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    /// Decoded response body.
    pub body: T,
    /// Limit and usage reported on the response.
    pub rate: RateReport,
}

define_port_error! {
    /// Errors surfaced while calling the API.
    pub enum StravaApiError {
        /// Credentials were rejected; retrying cannot help.
        Unauthorized { status: u16, message: String } =>
            "strava rejected credentials (status {status}): {message}",
        /// The request was rate limited. `retry_after_secs` is the server hint.
        RateLimited { retry_after_secs: Option<u64>, rate: RateReport } =>
            "strava rate limited the request (retry after {retry_after_secs:?}s)",
        /// Any other non-success status.
        Status { status: u16, message: String, rate: RateReport } =>
            "strava returned status {status}: {message}",
        /// Network transport failed before a response arrived.
        Transport { message: String } =>
            "strava transport failed: {message}",
        /// Response body could not be decoded.
        Decode { message: String } =>
            "strava response decode failed: {message}",
    }
}

/// Port for the token, athlete, list, and detail endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StravaApi: Send + Sync {
    /// Exchange a long-lived credential for an access credential.
    async fn refresh_access_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, StravaApiError>;

    /// Resolve the authenticated athlete's identifier.
    async fn fetch_athlete_id(&self, access_token: &str) -> Result<i64, StravaApiError>;

    /// Fetch one page of the authenticated athlete's activities.
    async fn list_activities(
        &self,
        access_token: &str,
        query: ActivityPageQuery,
    ) -> Result<ApiResponse<Vec<Value>>, StravaApiError>;

    /// Fetch the detailed representation of one activity.
    async fn fetch_activity_detail(
        &self,
        access_token: &str,
        activity_id: i64,
        include_efforts: bool,
    ) -> Result<ApiResponse<Value>, StravaApiError>;
}
