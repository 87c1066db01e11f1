//! Paginated activity pulls landed as immutable shards.
//!
//! A pull is incremental by default: only activities starting after the
//! newest start time already landed are requested. Unless the pull is a full
//! backfill, a second sliding-window pass re-lands the last few weeks so
//! fields that keep changing after upload (kudos, names) converge once
//! compaction picks the newer rows.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::domain::PipelineError;
use crate::domain::backlog::days_before;
use crate::domain::pacing::PacingRuntime;
use crate::domain::ports::{ActivityPageQuery, ShardStore, StravaApi, StravaApiError};
use crate::domain::rate_budget::BudgetSnapshot;
use crate::domain::records::{
    INGESTION_COLUMN, INGESTION_TIMESTAMP_FORMAT, OWNER_COLUMN, RawRecord, START_COLUMN,
    column_timestamp, value_as_i64,
};
use crate::domain::token_broker::TokenBroker;

/// Largest page the list endpoint serves.
pub const MAX_PAGE_SIZE: u32 = 200;
/// Default sliding refresh window in days.
pub const DEFAULT_REFRESH_DAYS: u32 = 21;
/// Pause between consecutive pages.
pub const PAGE_PAUSE: Duration = Duration::from_millis(200);
/// Pause after a list rate rejection without a retry hint.
pub const LIST_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(120);

/// Fields copied verbatim from a summary activity.
const SUMMARY_FIELDS: [&str; 23] = [
    "id",
    "name",
    "type",
    "distance",
    "moving_time",
    "elapsed_time",
    "total_elevation_gain",
    "start_date",
    "start_date_local",
    "timezone",
    "utc_offset",
    "achievement_count",
    "kudos_count",
    "average_speed",
    "max_speed",
    "average_heartrate",
    "max_heartrate",
    "suffer_score",
    "visibility",
    "gear_id",
    "location_city",
    "location_state",
    "location_country",
];

/// Knobs for one pull run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PullRequest {
    /// Ignore landed shards and fetch everything.
    pub full: bool,
    /// Requested page size; clamped to `1..=200`.
    pub per_page: u32,
    /// Days re-pulled by the sliding refresh; zero disables it.
    pub refresh_days: u32,
    /// Consecutive rate rejections tolerated per page.
    pub max_rate_limit_retries: u32,
}

impl Default for PullRequest {
    fn default() -> Self {
        Self {
            full: false,
            per_page: MAX_PAGE_SIZE,
            refresh_days: DEFAULT_REFRESH_DAYS,
            max_rate_limit_retries: 3,
        }
    }
}

/// One shard written by a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandedBatch {
    /// Shard name.
    pub shard: String,
    /// Records in the shard.
    pub rows: usize,
}

/// What a pull run landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    /// Owner the shards were landed for.
    pub athlete_id: i64,
    /// Incremental lower bound used, as unix seconds.
    pub after: Option<i64>,
    /// Main batch, when the API returned anything.
    pub landed: Option<LandedBatch>,
    /// Sliding-window batch, when one ran and returned anything.
    pub refreshed: Option<LandedBatch>,
}

/// Pulls activity pages and lands them through the [`ShardStore`].
pub struct ActivityPull {
    api: Arc<dyn StravaApi>,
    broker: TokenBroker,
    shards: Arc<dyn ShardStore>,
    clock: Arc<dyn Clock>,
    pacing: PacingRuntime,
}

impl ActivityPull {
    /// Build a pull service with Tokio pacing.
    pub fn new(
        api: Arc<dyn StravaApi>,
        broker: TokenBroker,
        shards: Arc<dyn ShardStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            broker,
            shards,
            clock,
            pacing: PacingRuntime::default(),
        }
    }

    /// Replace the sleep and jitter implementations.
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingRuntime) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run one pull.
    ///
    /// # Errors
    ///
    /// Returns credential errors from the token broker,
    /// [`PipelineError::Authorization`] when the list endpoint rejects the
    /// access credential, [`PipelineError::RateLimit`] when a page stays
    /// rate limited, [`PipelineError::TransientHttp`] for other endpoint
    /// failures, and [`PipelineError::Storage`] when shards cannot be read or
    /// written.
    pub async fn run(&self, request: &PullRequest) -> Result<PullReport, PipelineError> {
        let session = self.broker.authorize().await?;
        let athlete_id = match session.athlete_id {
            Some(athlete_id) => athlete_id,
            None => self
                .api
                .fetch_athlete_id(&session.access_token)
                .await
                .map_err(|error| classify(error, "athlete lookup"))?,
        };
        let owner = athlete_id.to_string();
        let per_page = request.per_page.clamp(1, MAX_PAGE_SIZE);

        let after = if request.full {
            None
        } else {
            self.latest_landed_start()?.map(|start| start.timestamp())
        };
        match after {
            Some(after) => info!(after, "incremental pull"),
            None => info!(full = request.full, "pulling all activities"),
        }

        let activities = self
            .fetch_all(&session.access_token, per_page, after, request)
            .await?;
        let landed = self.land(&owner, athlete_id, activities)?;

        let refreshed = if request.full || request.refresh_days == 0 {
            None
        } else {
            let since = days_before(self.clock.utc(), request.refresh_days)
                .map(|since| since.timestamp());
            let recent = self
                .fetch_all(&session.access_token, MAX_PAGE_SIZE, since, request)
                .await?;
            if recent.is_empty() {
                info!(days = request.refresh_days, "no recent activities to refresh");
            }
            self.land(&owner, athlete_id, recent)?
        };

        Ok(PullReport {
            athlete_id,
            after,
            landed,
            refreshed,
        })
    }

    fn latest_landed_start(&self) -> Result<Option<DateTime<Utc>>, PipelineError> {
        let names = self
            .shards
            .list_shards()
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        let mut latest = None;
        for name in &names {
            match self.shards.read_shard(name) {
                Ok(shard) => {
                    let newest = shard
                        .records
                        .iter()
                        .filter_map(|record| column_timestamp(record, START_COLUMN))
                        .max();
                    latest = latest.max(newest);
                }
                Err(error) => warn!(shard = %name, %error, "skipping unreadable shard"),
            }
        }
        Ok(latest)
    }

    async fn fetch_all(
        &self,
        access_token: &str,
        per_page: u32,
        after: Option<i64>,
        request: &PullRequest,
    ) -> Result<Vec<Value>, PipelineError> {
        let mut seen = BTreeSet::new();
        let mut activities = Vec::new();
        let mut page = 1;
        loop {
            let query = ActivityPageQuery {
                page,
                per_page,
                after,
            };
            let items = self.fetch_page(access_token, query, request).await?;
            if items.is_empty() {
                break;
            }
            let full_page = items.len() >= usize::try_from(per_page).unwrap_or(usize::MAX);
            for item in items {
                let id = item.get("id").and_then(value_as_i64);
                if id.is_none_or(|id| seen.insert(id)) {
                    activities.push(item);
                }
            }
            debug!(page, total = activities.len(), "fetched activity page");
            if !full_page {
                break;
            }
            page += 1;
            self.pacing.sleeper.sleep(PAGE_PAUSE).await;
        }
        Ok(activities)
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        query: ActivityPageQuery,
        request: &PullRequest,
    ) -> Result<Vec<Value>, PipelineError> {
        let mut rejections = 0;
        loop {
            match self.api.list_activities(access_token, query).await {
                Ok(response) => return Ok(response.body),
                Err(StravaApiError::RateLimited {
                    retry_after_secs,
                    rate,
                }) => {
                    rejections += 1;
                    if rejections > request.max_rate_limit_retries {
                        return Err(PipelineError::rate_limit(
                            format!("activity page {}", query.page),
                            rejections,
                            BudgetSnapshot {
                                limit: rate.limit,
                                used: rate.usage,
                            },
                        ));
                    }
                    let pause = retry_after_secs.map_or(LIST_RATE_LIMIT_PAUSE, Duration::from_secs);
                    warn!(
                        page = query.page,
                        attempt = rejections,
                        pause_secs = pause.as_secs(),
                        "list endpoint rate limited"
                    );
                    self.pacing.sleeper.sleep(pause).await;
                }
                Err(error) => {
                    return Err(classify(error, &format!("activity page {}", query.page)));
                }
            }
        }
    }

    fn land(
        &self,
        owner: &str,
        athlete_id: i64,
        activities: Vec<Value>,
    ) -> Result<Option<LandedBatch>, PipelineError> {
        if activities.is_empty() {
            return Ok(None);
        }
        let fetched_at = self.clock.utc();
        let stamp = fetched_at.format(INGESTION_TIMESTAMP_FORMAT).to_string();
        let records: Vec<RawRecord> = activities
            .iter()
            .map(|activity| flatten(activity, athlete_id, &stamp))
            .collect();
        let shard = self
            .shards
            .write_shard(owner, fetched_at, &records)
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        info!(shard = %shard, rows = records.len(), "landed activity shard");
        Ok(Some(LandedBatch {
            shard,
            rows: records.len(),
        }))
    }
}

/// Project a summary activity onto the landed record shape.
pub fn flatten(activity: &Value, athlete_id: i64, ingestion_ts: &str) -> RawRecord {
    let field = |name: &str| activity.get(name).cloned().unwrap_or(Value::Null);
    let map = activity.get("map");
    let map_field = |name: &str| {
        map.and_then(|map| map.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    };

    let mut record: RawRecord = SUMMARY_FIELDS
        .iter()
        .map(|name| ((*name).to_owned(), field(name)))
        .collect::<Map<String, Value>>();
    let sport_type = match field("sport_type") {
        Value::Null => field("type"),
        sport_type => sport_type,
    };
    record.insert("sport_type".to_owned(), sport_type);
    record.insert("commute".to_owned(), Value::Bool(truthy(&field("commute"))));
    record.insert("manual".to_owned(), Value::Bool(truthy(&field("manual"))));
    record.insert("map_id".to_owned(), map_field("id"));
    record.insert("polyline".to_owned(), map_field("polyline"));
    record.insert("summary_polyline".to_owned(), map_field("summary_polyline"));
    let owner = activity
        .get("athlete")
        .and_then(|athlete| athlete.get("id"))
        .and_then(value_as_i64)
        .unwrap_or(athlete_id);
    record.insert(OWNER_COLUMN.to_owned(), Value::from(owner));
    record.insert(INGESTION_COLUMN.to_owned(), Value::from(ingestion_ts));
    record
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    }
}

fn classify(error: StravaApiError, context: &str) -> PipelineError {
    match error {
        StravaApiError::Unauthorized { status, message } => {
            PipelineError::authorization(status, format!("{context}: {message}"))
        }
        StravaApiError::Status {
            status,
            message,
            rate,
        } => PipelineError::transient_http(
            context,
            status,
            message,
            BudgetSnapshot {
                limit: rate.limit,
                used: rate.usage,
            },
        ),
        other => PipelineError::transient_http(
            context,
            None::<u16>,
            other.to_string(),
            BudgetSnapshot::default(),
        ),
    }
}
