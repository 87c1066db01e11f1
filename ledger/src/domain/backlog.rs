//! Backlog selection: canonical activities still lacking enrichment detail.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;
use tracing::{debug, info, warn};

use crate::domain::PipelineError;
use crate::domain::ports::{AnalyticStore, CandidateActivity, DetailRepository, ShardStore};
use crate::domain::records::{ID_COLUMN, START_COLUMN, column_i64, column_timestamp};

/// Default recency window in days.
pub const DEFAULT_RECENCY_DAYS: u32 = 30;

/// Start-time filter applied to candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencyFilter {
    /// No filter.
    All,
    /// Only activities that started within the last N days.
    SinceDays(u32),
}

impl Default for RecencyFilter {
    fn default() -> Self {
        Self::SinceDays(DEFAULT_RECENCY_DAYS)
    }
}

/// What the caller wants enriched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BacklogQuery {
    /// Recency filter for discovered candidates.
    pub recency: RecencyFilter,
    /// Explicit identifiers; bypasses discovery and the recency filter.
    pub explicit_ids: Option<Vec<i64>>,
}

/// One activity pending enrichment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogItem {
    /// Activity identifier.
    pub activity_id: i64,
    /// Event start time, when known.
    pub start_date: Option<DateTime<Utc>>,
}

/// Resolves the ordered list of activities to enrich.
pub struct BacklogSelector {
    analytic_store: Arc<dyn AnalyticStore>,
    shards: Arc<dyn ShardStore>,
    details: Arc<dyn DetailRepository>,
    clock: Arc<dyn Clock>,
}

impl BacklogSelector {
    /// Build a selector over the canonical, landing, and detail ports.
    pub fn new(
        analytic_store: Arc<dyn AnalyticStore>,
        shards: Arc<dyn ShardStore>,
        details: Arc<dyn DetailRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            analytic_store,
            shards,
            details,
            clock,
        }
    }

    /// Return candidates missing from the detail store.
    ///
    /// Discovered candidates are ordered newest start first with unknown
    /// starts last; explicit ids are ordered by descending id. No available
    /// candidate source yields an empty backlog.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] when a source or the detail store
    /// cannot be read.
    pub async fn select(&self, query: &BacklogQuery) -> Result<Vec<BacklogItem>, PipelineError> {
        if let Some(ids) = query.explicit_ids.as_ref().filter(|ids| !ids.is_empty()) {
            return self.select_explicit(ids).await;
        }

        let Some(candidates) = self.discover().await? else {
            warn!("no canonical table or landed shards; backlog is empty");
            return Ok(Vec::new());
        };
        let cutoff = match query.recency {
            RecencyFilter::All => None,
            RecencyFilter::SinceDays(days) => {
                let cutoff = days_before(self.clock.utc(), days);
                if cutoff.is_none() {
                    debug!(days, "recency window predates the calendar; not filtering");
                }
                cutoff
            }
        };
        let recent: Vec<CandidateActivity> = candidates
            .into_iter()
            .filter(|candidate| match cutoff {
                None => true,
                Some(cutoff) => candidate.start_date.is_some_and(|start| start >= cutoff),
            })
            .collect();

        let mut backlog = self.without_existing(recent).await?;
        backlog.sort_by(by_recency);
        info!(candidates = backlog.len(), "selected enrichment backlog");
        Ok(backlog)
    }

    async fn select_explicit(&self, ids: &[i64]) -> Result<Vec<BacklogItem>, PipelineError> {
        let mut unique = ids.to_vec();
        unique.sort_unstable_by(|left, right| right.cmp(left));
        unique.dedup();
        let candidates = unique
            .into_iter()
            .map(|activity_id| CandidateActivity {
                activity_id,
                start_date: None,
            })
            .collect();
        let backlog = self.without_existing(candidates).await?;
        info!(candidates = backlog.len(), "selected explicit backlog");
        Ok(backlog)
    }

    /// Canonical candidates when a publication exists, else landed shards.
    async fn discover(&self) -> Result<Option<Vec<CandidateActivity>>, PipelineError> {
        let canonical = self
            .analytic_store
            .canonical_candidates()
            .await
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        if let Some(candidates) = canonical {
            debug!(rows = candidates.len(), "backlog source: canonical table");
            return Ok(Some(candidates));
        }
        self.candidates_from_shards()
    }

    fn candidates_from_shards(&self) -> Result<Option<Vec<CandidateActivity>>, PipelineError> {
        let names = self
            .shards
            .list_shards()
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        if names.is_empty() {
            return Ok(None);
        }
        debug!(shards = names.len(), "backlog source: landed shards");

        let mut latest: BTreeMap<i64, Option<DateTime<Utc>>> = BTreeMap::new();
        for name in &names {
            let shard = self
                .shards
                .read_shard(name)
                .map_err(|error| PipelineError::storage(error.to_string()))?;
            for record in &shard.records {
                let Some(activity_id) = column_i64(record, ID_COLUMN) else {
                    continue;
                };
                let start = column_timestamp(record, START_COLUMN);
                let slot = latest.entry(activity_id).or_insert(start);
                *slot = (*slot).max(start);
            }
        }
        Ok(Some(
            latest
                .into_iter()
                .map(|(activity_id, start_date)| CandidateActivity {
                    activity_id,
                    start_date,
                })
                .collect(),
        ))
    }

    async fn without_existing(
        &self,
        candidates: Vec<CandidateActivity>,
    ) -> Result<Vec<BacklogItem>, PipelineError> {
        let ids: Vec<i64> = candidates.iter().map(|c| c.activity_id).collect();
        let existing = self
            .details
            .existing_ids(&ids)
            .await
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        Ok(candidates
            .into_iter()
            .filter(|candidate| !existing.contains(&candidate.activity_id))
            .map(|candidate| BacklogItem {
                activity_id: candidate.activity_id,
                start_date: candidate.start_date,
            })
            .collect())
    }
}

/// The instant `days` before `now`, or `None` when that lies outside the
/// representable calendar.
pub(crate) fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window))
}

fn by_recency(left: &BacklogItem, right: &BacklogItem) -> Ordering {
    let starts = match (left.start_date, right.start_date) {
        (Some(left), Some(right)) => right.cmp(&left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    starts.then_with(|| right.activity_id.cmp(&left.activity_id))
}
