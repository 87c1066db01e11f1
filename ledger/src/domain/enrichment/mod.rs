//! Rate-budgeted enrichment loop.
//!
//! The loop walks the backlog one activity at a time. Before each call it
//! consults the [`RateBudget`] and pauses to the next quarter-hour window when
//! the cushion would be breached. A rate rejection pauses and retries the same
//! activity without advancing the cursor; every other failure ends the run.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tracing::{info, warn};

use crate::domain::PipelineError;
use crate::domain::backlog::{BacklogItem, BacklogQuery, BacklogSelector};
use crate::domain::detail::DetailPersister;
use crate::domain::pacing::PacingRuntime;
use crate::domain::ports::{StravaApi, StravaApiError};
use crate::domain::rate_budget::{BudgetSnapshot, DEFAULT_CUSHIONS, RateBudget, WindowPair};
use crate::domain::token_broker::TokenBroker;

/// Default minimum pause after a rate rejection.
pub const DEFAULT_SLEEP_FLOOR: Duration = Duration::from_secs(5);
/// Default number of consecutive rate rejections tolerated per activity.
pub const DEFAULT_MAX_RATE_LIMIT_RETRIES: u32 = 8;

const UNKNOWN_OWNER: &str = "unknown";

/// Knobs for one enrichment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentRequest {
    /// Which activities to consider.
    pub query: BacklogQuery,
    /// Ask the detail endpoint for segment efforts too.
    pub include_efforts: bool,
    /// Stop cleanly after this many successful calls.
    pub max_calls: Option<u32>,
    /// Minimum pause applied to a server retry hint.
    pub sleep_floor: Duration,
    /// Select and authorize, but make no detail calls.
    pub dry_run: bool,
    /// Calls held back from each window.
    pub cushion: WindowPair,
    /// Consecutive rate rejections tolerated for one activity.
    pub max_rate_limit_retries: u32,
}

impl Default for EnrichmentRequest {
    fn default() -> Self {
        Self {
            query: BacklogQuery::default(),
            include_efforts: false,
            max_calls: None,
            sleep_floor: DEFAULT_SLEEP_FLOOR,
            dry_run: false,
            cushion: DEFAULT_CUSHIONS,
            max_rate_limit_retries: DEFAULT_MAX_RATE_LIMIT_RETRIES,
        }
    }
}

/// Totals from a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSummary {
    /// Activities fetched and persisted.
    pub processed: u32,
    /// Backlog size at the start of the run.
    pub candidates: usize,
    /// Budget state after the last call.
    pub budget: BudgetSnapshot,
    /// Whether the run stopped at the call cap.
    pub reached_cap: bool,
}

/// How an enrichment run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    /// The backlog was empty.
    NothingToDo,
    /// Dry run: the backlog that would have been fetched.
    Planned {
        /// Selected activities in fetch order.
        candidates: Vec<BacklogItem>,
    },
    /// The loop ran.
    Completed(EnrichmentSummary),
}

/// Drives the fetch loop over the enrichment backlog.
pub struct DetailFetcher {
    backlog: BacklogSelector,
    broker: TokenBroker,
    api: Arc<dyn StravaApi>,
    persister: DetailPersister,
    clock: Arc<dyn Clock>,
    pacing: PacingRuntime,
    configured_owner: Option<i64>,
}

/// Loop position: which item, how many done, how many rejections in a row.
struct Cursor {
    index: usize,
    processed: u32,
    rejections: u32,
}

impl DetailFetcher {
    /// Build a fetcher with Tokio pacing.
    pub fn new(
        backlog: BacklogSelector,
        broker: TokenBroker,
        api: Arc<dyn StravaApi>,
        persister: DetailPersister,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backlog,
            broker,
            api,
            persister,
            clock,
            pacing: PacingRuntime::default(),
            configured_owner: None,
        }
    }

    /// Replace the sleep and jitter implementations.
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingRuntime) -> Self {
        self.pacing = pacing;
        self
    }

    /// Owner used to name archive entries when neither the payload nor the
    /// token grant carries one.
    #[must_use]
    pub fn with_configured_owner(mut self, athlete_id: Option<i64>) -> Self {
        self.configured_owner = athlete_id;
        self
    }

    /// Run one enrichment pass.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] or
    /// [`PipelineError::Authorization`] from credential refresh,
    /// [`PipelineError::RateLimit`] when one activity is rejected more than
    /// `max_rate_limit_retries` times in a row,
    /// [`PipelineError::TransientHttp`] for any other failed call, and
    /// storage errors from selection or persistence.
    pub async fn run(&self, request: &EnrichmentRequest) -> Result<EnrichmentOutcome, PipelineError> {
        let backlog = self.backlog.select(&request.query).await?;
        if backlog.is_empty() {
            info!("nothing to enrich");
            return Ok(EnrichmentOutcome::NothingToDo);
        }

        let session = self.broker.authorize().await?;
        if request.dry_run {
            info!(candidates = backlog.len(), "dry run; no detail calls made");
            return Ok(EnrichmentOutcome::Planned {
                candidates: backlog,
            });
        }

        let owner = session
            .athlete_id
            .or(self.configured_owner)
            .map_or_else(|| UNKNOWN_OWNER.to_owned(), |id| id.to_string());
        let mut budget = RateBudget::new(request.cushion);
        let mut cursor = Cursor {
            index: 0,
            processed: 0,
            rejections: 0,
        };
        let cap = request.max_calls.unwrap_or(u32::MAX);

        while let Some(item) = backlog.get(cursor.index) {
            if cursor.processed >= cap {
                break;
            }
            if let Some(exhaustion) = budget.would_exceed_next() {
                let pause = self.pacing.until_next_window(self.clock.utc());
                info!(
                    reason = %exhaustion,
                    pause_secs = pause.as_secs(),
                    "pausing to next rate window"
                );
                self.pacing.sleeper.sleep(pause).await;
            }

            let response = self
                .api
                .fetch_activity_detail(&session.access_token, item.activity_id, request.include_efforts)
                .await;
            match response {
                Ok(response) => {
                    budget.update(response.rate);
                    self.persister.persist(&response.body, &owner).await?;
                    cursor.processed += 1;
                    cursor.index += 1;
                    cursor.rejections = 0;
                    let snapshot = budget.snapshot();
                    info!(
                        activity_id = item.activity_id,
                        processed = cursor.processed,
                        candidates = backlog.len(),
                        short_used = snapshot.used.short,
                        short_limit = snapshot.limit.short,
                        long_used = snapshot.used.long,
                        long_limit = snapshot.limit.long,
                        "enriched activity"
                    );
                }
                Err(StravaApiError::RateLimited {
                    retry_after_secs,
                    rate,
                }) => {
                    budget.update(rate);
                    cursor.rejections += 1;
                    if cursor.rejections > request.max_rate_limit_retries {
                        return Err(PipelineError::rate_limit(
                            format!("activity {}", item.activity_id),
                            cursor.rejections,
                            budget.snapshot(),
                        ));
                    }
                    let pause = match retry_after_secs {
                        Some(secs) => Duration::from_secs(secs).max(request.sleep_floor),
                        None => self.pacing.until_next_window(self.clock.utc()),
                    };
                    warn!(
                        activity_id = item.activity_id,
                        attempt = cursor.rejections,
                        pause_secs = pause.as_secs(),
                        "rate limited; retrying same activity"
                    );
                    self.pacing.sleeper.sleep(pause).await;
                }
                Err(error) => return Err(classify(error, item.activity_id, &budget)),
            }
        }

        let reached_cap = cursor.processed >= cap && cursor.index < backlog.len();
        let summary = EnrichmentSummary {
            processed: cursor.processed,
            candidates: backlog.len(),
            budget: budget.snapshot(),
            reached_cap,
        };
        info!(
            processed = summary.processed,
            candidates = summary.candidates,
            reached_cap,
            "enrichment finished"
        );
        Ok(EnrichmentOutcome::Completed(summary))
    }
}

fn classify(error: StravaApiError, activity_id: i64, budget: &RateBudget) -> PipelineError {
    let context = format!("detail fetch for activity {activity_id}");
    match error {
        StravaApiError::Unauthorized { status, message } => {
            PipelineError::authorization(status, format!("{context}: {message}"))
        }
        StravaApiError::Status {
            status, message, ..
        } => PipelineError::transient_http(context, status, message, budget.snapshot()),
        other => PipelineError::transient_http(context, None::<u16>, other.to_string(), budget.snapshot()),
    }
}
