//! Scripted Strava API double.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Value, json};
use zeroize::Zeroizing;

use crate::domain::ports::{
    ActivityPageQuery, ApiResponse, ClientCredentials, StravaApi, StravaApiError, TokenGrant,
};
use crate::domain::rate_budget::RateReport;

type DetailResult = Result<ApiResponse<Value>, StravaApiError>;
type PageResult = Result<ApiResponse<Vec<Value>>, StravaApiError>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(_) => panic!("scripted api mutex poisoned"),
    }
}

/// API double replaying scripted responses in order.
///
/// Once a script is exhausted, detail calls echo `{"id": <requested id>}`,
/// list calls return an empty page, and token refreshes grant
/// `access-token` without rotating.
pub struct ScriptedStravaApi {
    athlete_id: i64,
    grants: Mutex<VecDeque<Result<TokenGrant, StravaApiError>>>,
    pages: Mutex<VecDeque<PageResult>>,
    details: Mutex<VecDeque<DetailResult>>,
    refresh_calls: Mutex<Vec<String>>,
    list_calls: Mutex<Vec<ActivityPageQuery>>,
    detail_calls: Mutex<Vec<i64>>,
}

impl Default for ScriptedStravaApi {
    fn default() -> Self {
        Self::new(7)
    }
}

impl ScriptedStravaApi {
    /// Build a double answering the athlete endpoint with `athlete_id`.
    pub fn new(athlete_id: i64) -> Self {
        Self {
            athlete_id,
            grants: Mutex::new(VecDeque::new()),
            pages: Mutex::new(VecDeque::new()),
            details: Mutex::new(VecDeque::new()),
            refresh_calls: Mutex::new(Vec::new()),
            list_calls: Mutex::new(Vec::new()),
            detail_calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a token endpoint result.
    pub fn push_grant(&self, grant: Result<TokenGrant, StravaApiError>) {
        lock(&self.grants).push_back(grant);
    }

    /// Queue a list endpoint result.
    pub fn push_page(&self, page: PageResult) {
        lock(&self.pages).push_back(page);
    }

    /// Queue a list page of records with a default rate report.
    pub fn push_records(&self, records: Vec<Value>) {
        self.push_page(Ok(ApiResponse {
            body: records,
            rate: RateReport::default(),
        }));
    }

    /// Queue a detail endpoint result.
    pub fn push_detail(&self, detail: DetailResult) {
        lock(&self.details).push_back(detail);
    }

    /// Refresh credentials presented so far.
    pub fn refresh_calls(&self) -> Vec<String> {
        lock(&self.refresh_calls).clone()
    }

    /// List queries issued so far.
    pub fn list_calls(&self) -> Vec<ActivityPageQuery> {
        lock(&self.list_calls).clone()
    }

    /// Detail ids requested so far, including retries.
    pub fn detail_calls(&self) -> Vec<i64> {
        lock(&self.detail_calls).clone()
    }
}

/// A grant with the given access credential and optional rotation.
pub fn grant(access_token: &str, rotated: Option<&str>, athlete_id: Option<i64>) -> TokenGrant {
    TokenGrant {
        access_token: Zeroizing::new(access_token.to_owned()),
        refresh_token: rotated.map(|token| Zeroizing::new(token.to_owned())),
        athlete_id,
        scope: Some("read,activity:read_all".to_owned()),
    }
}

#[async_trait]
impl StravaApi for ScriptedStravaApi {
    async fn refresh_access_token(
        &self,
        _credentials: &ClientCredentials,
        refresh_token: &str,
    ) -> Result<TokenGrant, StravaApiError> {
        lock(&self.refresh_calls).push(refresh_token.to_owned());
        lock(&self.grants)
            .pop_front()
            .unwrap_or_else(|| Ok(grant("access-token", None, None)))
    }

    async fn fetch_athlete_id(&self, _access_token: &str) -> Result<i64, StravaApiError> {
        Ok(self.athlete_id)
    }

    async fn list_activities(
        &self,
        _access_token: &str,
        query: ActivityPageQuery,
    ) -> Result<ApiResponse<Vec<Value>>, StravaApiError> {
        lock(&self.list_calls).push(query);
        lock(&self.pages).pop_front().unwrap_or_else(|| {
            Ok(ApiResponse {
                body: Vec::new(),
                rate: RateReport::default(),
            })
        })
    }

    async fn fetch_activity_detail(
        &self,
        _access_token: &str,
        activity_id: i64,
        _include_efforts: bool,
    ) -> Result<ApiResponse<Value>, StravaApiError> {
        lock(&self.detail_calls).push(activity_id);
        lock(&self.details).pop_front().unwrap_or_else(|| {
            Ok(ApiResponse {
                body: json!({ "id": activity_id }),
                rate: RateReport::default(),
            })
        })
    }
}
