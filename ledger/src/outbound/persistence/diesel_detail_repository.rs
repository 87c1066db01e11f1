//! SQLite-backed `DetailRepository` implementation.
//!
//! A detail merge replaces the parent row and each child collection the
//! record carries inside one transaction. Collections the record leaves as
//! `None` keep their stored rows.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::detail::DetailRecord;
use crate::domain::ports::{DetailRepository, DetailRepositoryError};

use super::database::Warehouse;
use super::diesel_helpers::{ID_CHUNK, map_diesel_error};
use super::models::{NewDetailRow, NewMetricSplitRow, NewSegmentEffortRow, NewStandardSplitRow};
use super::schema::{
    activity_details, activity_segment_efforts, activity_splits_metric, activity_splits_standard,
};

/// Diesel-backed detail store.
#[derive(Clone)]
pub struct DieselDetailRepository {
    warehouse: Warehouse,
}

impl DieselDetailRepository {
    /// Create a repository over the shared warehouse connection.
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }
}

fn map_error(error: diesel::result::Error, operation: &str) -> DetailRepositoryError {
    map_diesel_error(
        error,
        operation,
        DetailRepositoryError::query,
        DetailRepositoryError::connection,
    )
}

#[async_trait]
impl DetailRepository for DieselDetailRepository {
    async fn existing_ids(&self, candidates: &[i64]) -> Result<BTreeSet<i64>, DetailRepositoryError> {
        let mut conn = self.warehouse.connection().await;
        let mut found = BTreeSet::new();
        for chunk in candidates.chunks(ID_CHUNK) {
            let ids: Vec<i64> = activity_details::table
                .filter(activity_details::activity_id.eq_any(chunk))
                .select(activity_details::activity_id)
                .load(&mut *conn)
                .await
                .map_err(|error| map_error(error, "select existing details"))?;
            found.extend(ids);
        }
        Ok(found)
    }

    async fn upsert_detail(
        &self,
        record: &DetailRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DetailRepositoryError> {
        let activity_id = record.activity_id;
        let parent = NewDetailRow::new(record, fetched_at);
        let metric: Option<Vec<NewMetricSplitRow>> = record.splits_metric.as_ref().map(|splits| {
            splits
                .iter()
                .map(|split| NewMetricSplitRow::new(activity_id, split))
                .collect()
        });
        let standard: Option<Vec<NewStandardSplitRow>> =
            record.splits_standard.as_ref().map(|splits| {
                splits
                    .iter()
                    .map(|split| NewStandardSplitRow::new(activity_id, split))
                    .collect()
            });
        let efforts: Option<Vec<NewSegmentEffortRow<'_>>> =
            record.segment_efforts.as_ref().map(|efforts| {
                efforts
                    .iter()
                    .map(|effort| NewSegmentEffortRow::new(activity_id, effort))
                    .collect()
            });

        let mut conn = self.warehouse.connection().await;
        conn.transaction(|conn| {
            async move {
                diesel::replace_into(activity_details::table)
                    .values(&parent)
                    .execute(conn)
                    .await?;

                if let Some(rows) = &metric {
                    diesel::delete(
                        activity_splits_metric::table
                            .filter(activity_splits_metric::activity_id.eq(activity_id)),
                    )
                    .execute(conn)
                    .await?;
                    for row in rows {
                        diesel::insert_into(activity_splits_metric::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                }

                if let Some(rows) = &standard {
                    diesel::delete(
                        activity_splits_standard::table
                            .filter(activity_splits_standard::activity_id.eq(activity_id)),
                    )
                    .execute(conn)
                    .await?;
                    for row in rows {
                        diesel::insert_into(activity_splits_standard::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                }

                if let Some(rows) = &efforts {
                    diesel::delete(
                        activity_segment_efforts::table
                            .filter(activity_segment_efforts::activity_id.eq(activity_id)),
                    )
                    .execute(conn)
                    .await?;
                    // Effort ids are global; an effort re-attributed to this
                    // activity replaces its old row.
                    for row in rows {
                        diesel::replace_into(activity_segment_efforts::table)
                            .values(row)
                            .execute(conn)
                            .await?;
                    }
                }

                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(|error| map_error(error, "replace activity detail"))?;

        debug!(activity_id, "merged activity detail");
        Ok(())
    }
}
