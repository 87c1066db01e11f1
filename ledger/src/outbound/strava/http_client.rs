//! Reqwest-backed Strava API adapter.
//!
//! Owns transport details only: endpoint URLs, bearer headers, rate header
//! parsing, and mapping HTTP statuses onto [`StravaApiError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;

use super::dto::{AthleteDto, TokenResponseDto};
use crate::domain::ports::{
    ActivityPageQuery, ApiResponse, ClientCredentials, StravaApi, StravaApiError, TokenGrant,
};
use crate::domain::rate_budget::{RateReport, WindowPair};

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const USAGE_HEADER: &str = "x-ratelimit-usage";
const USER_AGENT: &str = "ledger-strava-pipeline/0.1";
/// Retry hint assumed when the server sends an unparseable `Retry-After`.
const FALLBACK_RETRY_AFTER_SECS: u64 = 60;

/// Strava REST client rooted at one API base URL.
pub struct StravaHttpClient {
    client: Client,
    base_url: Url,
}

impl StravaHttpClient {
    /// Build a client with an explicit request timeout.
    ///
    /// `base_url` must end with `/` so endpoint paths join beneath it.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, StravaApiError> {
        self.base_url.join(path).map_err(|error| {
            StravaApiError::transport(format!("invalid endpoint '{path}': {error}"))
        })
    }

    async fn send_json(
        &self,
        request: RequestBuilder,
    ) -> Result<(Value, RateReport), StravaApiError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let rate = rate_report(&headers);
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, &headers, body.as_ref()));
        }
        let value = serde_json::from_slice(body.as_ref()).map_err(|error| {
            StravaApiError::decode(format!("invalid JSON payload: {error}"))
        })?;
        Ok((value, rate))
    }
}

#[async_trait]
impl StravaApi for StravaHttpClient {
    async fn refresh_access_token(
        &self,
        credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, StravaApiError> {
        let form = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .client
            .post(self.endpoint("oauth/token")?)
            .form(&form)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if status == StatusCode::BAD_REQUEST {
            // Revoked or already-rotated refresh credentials come back as 400.
            return Err(StravaApiError::unauthorized(
                status.as_u16(),
                describe(status, body.as_ref()),
            ));
        }
        if !status.is_success() {
            return Err(map_status_error(status, &headers, body.as_ref()));
        }
        let dto: TokenResponseDto = serde_json::from_slice(body.as_ref()).map_err(|error| {
            StravaApiError::decode(format!("invalid token payload: {error}"))
        })?;
        dto.into_grant().map_err(StravaApiError::decode)
    }

    async fn fetch_athlete_id(&self, access_token: &str) -> Result<i64, StravaApiError> {
        let request = self
            .client
            .get(self.endpoint("athlete")?)
            .bearer_auth(access_token);
        let (value, _) = self.send_json(request).await?;
        let athlete: AthleteDto = serde_json::from_value(value).map_err(|error| {
            StravaApiError::decode(format!("invalid athlete payload: {error}"))
        })?;
        athlete
            .id
            .ok_or_else(|| StravaApiError::decode("athlete payload carried no id"))
    }

    async fn list_activities(
        &self,
        access_token: &str,
        query: ActivityPageQuery,
    ) -> Result<ApiResponse<Vec<Value>>, StravaApiError> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if let Some(after) = query.after {
            params.push(("after", after.to_string()));
        }
        let request = self
            .client
            .get(self.endpoint("athlete/activities")?)
            .bearer_auth(access_token)
            .query(&params);
        let (value, rate) = self.send_json(request).await?;
        match value {
            Value::Array(items) => Ok(ApiResponse { body: items, rate }),
            other => Err(StravaApiError::decode(format!(
                "activity list was not an array: {}",
                body_preview(other.to_string().as_bytes())
            ))),
        }
    }

    async fn fetch_activity_detail(
        &self,
        access_token: &str,
        activity_id: i64,
        include_efforts: bool,
    ) -> Result<ApiResponse<Value>, StravaApiError> {
        let request = self
            .client
            .get(self.endpoint(&format!("activities/{activity_id}"))?)
            .bearer_auth(access_token)
            .query(&[("include_all_efforts", include_efforts)]);
        let (body, rate) = self.send_json(request).await?;
        Ok(ApiResponse { body, rate })
    }
}

/// Read the two-window limit and usage headers; missing or malformed
/// headers read as zero, meaning "not reported".
fn rate_report(headers: &HeaderMap) -> RateReport {
    RateReport {
        limit: window_pair(headers, LIMIT_HEADER),
        usage: window_pair(headers, USAGE_HEADER),
    }
}

fn window_pair(headers: &HeaderMap, name: &str) -> WindowPair {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_window_pair)
        .unwrap_or_default()
}

/// Parse `"short,long"` header values such as `"100,1000"`.
fn parse_window_pair(raw: &str) -> Option<WindowPair> {
    let mut parts = raw.split(',').map(str::trim);
    let short = parts.next()?.parse().ok()?;
    let long = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(WindowPair::new(short, long))
}

fn retry_after(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?;
    Some(
        raw.to_str()
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(FALLBACK_RETRY_AFTER_SECS),
    )
}

fn map_transport_error(error: reqwest::Error) -> StravaApiError {
    StravaApiError::transport(error.to_string())
}

fn map_status_error(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> StravaApiError {
    let message = describe(status, body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            StravaApiError::rate_limited(retry_after(headers), rate_report(headers))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StravaApiError::unauthorized(status.as_u16(), message)
        }
        _ => StravaApiError::status(status.as_u16(), message, rate_report(headers)),
    }
}

fn describe(status: StatusCode, body: &[u8]) -> String {
    let preview = body_preview(body);
    if preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {preview}", status.as_u16())
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    //! Coverage for header parsing and status mapping.

    use super::*;
    use reqwest::header::HeaderValue;
    use rstest::rstest;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[rstest]
    #[case::typical("100,1000", Some(WindowPair::new(100, 1_000)))]
    #[case::spaced(" 7 , 250 ", Some(WindowPair::new(7, 250)))]
    #[case::single("100", None)]
    #[case::triple("1,2,3", None)]
    #[case::garbage("a,b", None)]
    fn parses_window_pairs(#[case] raw: &str, #[case] expected: Option<WindowPair>) {
        assert_eq!(parse_window_pair(raw), expected);
    }

    #[test]
    fn missing_rate_headers_read_as_unreported() {
        let report = rate_report(&headers(&[("x-ratelimit-usage", "12,340")]));
        assert_eq!(report.limit, WindowPair::default());
        assert_eq!(report.usage, WindowPair::new(12, 340));
    }

    #[rstest]
    #[case::seconds(&[("retry-after", "90")], Some(90))]
    #[case::unparseable(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")], Some(60))]
    #[case::absent(&[], None)]
    fn reads_retry_hint(
        #[case] pairs: &[(&'static str, &'static str)],
        #[case] expected: Option<u64>,
    ) {
        assert_eq!(retry_after(&headers(pairs)), expected);
    }

    #[test]
    fn too_many_requests_maps_to_rate_limited_with_report() {
        let error = map_status_error(
            StatusCode::TOO_MANY_REQUESTS,
            &headers(&[
                ("retry-after", "30"),
                ("x-ratelimit-limit", "100,1000"),
                ("x-ratelimit-usage", "101,400"),
            ]),
            b"",
        );
        assert_eq!(
            error,
            StravaApiError::rate_limited(
                Some(30_u64),
                RateReport {
                    limit: WindowPair::new(100, 1_000),
                    usage: WindowPair::new(101, 400),
                }
            )
        );
    }

    #[rstest]
    #[case::unauthorized(StatusCode::UNAUTHORIZED, true)]
    #[case::forbidden(StatusCode::FORBIDDEN, true)]
    #[case::not_found(StatusCode::NOT_FOUND, false)]
    #[case::server_error(StatusCode::BAD_GATEWAY, false)]
    fn classifies_rejections(#[case] status: StatusCode, #[case] fatal_auth: bool) {
        let error = map_status_error(status, &HeaderMap::new(), b"{\"message\": \"nope\"}");
        assert_eq!(
            matches!(error, StravaApiError::Unauthorized { .. }),
            fatal_auth,
            "unexpected mapping for {status}: {error}"
        );
        if !fatal_auth {
            assert!(matches!(error, StravaApiError::Status { status: s, .. } if s == status.as_u16()));
        }
    }

    #[test]
    fn long_bodies_are_truncated_in_messages() {
        let body = "x".repeat(400);
        let preview = body_preview(body.as_bytes());
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 163);
    }

    #[test]
    fn endpoints_join_beneath_the_base() {
        let client = StravaHttpClient::new(
            Url::parse("https://www.strava.com/api/v3/").expect("valid url"),
            Duration::from_secs(5),
        )
        .expect("client builds");
        assert_eq!(
            client.endpoint("athlete/activities").expect("joins").as_str(),
            "https://www.strava.com/api/v3/athlete/activities"
        );
    }
}
