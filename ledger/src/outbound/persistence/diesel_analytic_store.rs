//! SQLite-backed `AnalyticStore` implementation.
//!
//! The canonical table is replaced wholesale inside one transaction together
//! with a `canonical_publications` audit row, so readers of the `activities`
//! view see either the previous or the new publication.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::debug;

use crate::domain::ports::{
    AnalyticStore, AnalyticStoreError, CandidateActivity, CanonicalPublication,
};

use super::database::Warehouse;
use super::diesel_helpers::map_diesel_error;
use super::models::{CandidateRow, NewCanonicalRow, NewPublicationRow};
use super::schema::{canonical_publications, gold_activities};

/// Diesel-backed analytic store.
#[derive(Clone)]
pub struct DieselAnalyticStore {
    warehouse: Warehouse,
}

impl DieselAnalyticStore {
    /// Create a store over the shared warehouse connection.
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }
}

fn map_error(error: diesel::result::Error, operation: &str) -> AnalyticStoreError {
    map_diesel_error(
        error,
        operation,
        AnalyticStoreError::query,
        AnalyticStoreError::connection,
    )
}

#[async_trait]
impl AnalyticStore for DieselAnalyticStore {
    async fn replace_canonical(
        &self,
        publication: &CanonicalPublication,
    ) -> Result<(), AnalyticStoreError> {
        let rows: Vec<NewCanonicalRow<'_>> =
            publication.rows.iter().map(NewCanonicalRow::from).collect();
        let audit = NewPublicationRow::new(publication);

        let mut conn = self.warehouse.connection().await;
        conn.transaction(|conn| {
            async move {
                diesel::delete(gold_activities::table).execute(conn).await?;
                for row in &rows {
                    diesel::insert_into(gold_activities::table)
                        .values(row)
                        .execute(conn)
                        .await?;
                }
                diesel::insert_into(canonical_publications::table)
                    .values(&audit)
                    .execute(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(())
            }
            .scope_boxed()
        })
        .await
        .map_err(|error| map_error(error, "replace canonical table"))?;

        debug!(rows = publication.rows.len(), "materialized canonical table");
        Ok(())
    }

    async fn canonical_candidates(
        &self,
    ) -> Result<Option<Vec<CandidateActivity>>, AnalyticStoreError> {
        let mut conn = self.warehouse.connection().await;
        let publications: i64 = canonical_publications::table
            .count()
            .get_result(&mut *conn)
            .await
            .map_err(|error| map_error(error, "count canonical publications"))?;
        if publications == 0 {
            return Ok(None);
        }

        let rows: Vec<CandidateRow> = gold_activities::table
            .filter(gold_activities::activity_id.is_not_null())
            .order(gold_activities::cluster_ordinal.asc())
            .select(CandidateRow::as_select())
            .load(&mut *conn)
            .await
            .map_err(|error| map_error(error, "select canonical candidates"))?;

        Ok(Some(
            rows.into_iter()
                .filter_map(|row| {
                    row.activity_id.map(|activity_id| CandidateActivity {
                        activity_id,
                        start_date: row.start_date.map(|naive| naive.and_utc()),
                    })
                })
                .collect(),
        ))
    }
}
