//! Detail records and the persister that archives and merges them.
//!
//! Persisting a payload is two steps: the raw payload lands in the archive,
//! then the structured record replaces any stored row for the same activity.
//! The merge is idempotent on activity id, so replaying the archive after a
//! crash between the steps converges on the same state.

use std::sync::Arc;

use mockable::Clock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::PipelineError;
use crate::domain::ports::{DetailArchive, DetailArchiveError, DetailRepository, DetailRepositoryError};

mod payload;

pub use payload::{ActivitySummary, DetailPayloadError, DetailRecord, SegmentEffort, Split};

/// Summary of a replay pass over the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    /// Payloads merged into the detail store.
    pub merged: usize,
    /// Archived payloads skipped because they could not be parsed.
    pub skipped: usize,
}

/// Archives raw detail payloads and merges them into the detail store.
#[derive(Clone)]
pub struct DetailPersister {
    archive: Arc<dyn DetailArchive>,
    repository: Arc<dyn DetailRepository>,
    clock: Arc<dyn Clock>,
}

impl DetailPersister {
    /// Build a persister over the archive and detail store ports.
    pub fn new(
        archive: Arc<dyn DetailArchive>,
        repository: Arc<dyn DetailRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            archive,
            repository,
            clock,
        }
    }

    /// Archive `payload` raw, then replace the structured record.
    ///
    /// `fallback_owner` names the archive entry when the payload does not
    /// carry its athlete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPayload`] when the payload has no
    /// integral id, and [`PipelineError::Storage`] when either write fails.
    pub async fn persist(
        &self,
        payload: &Value,
        fallback_owner: &str,
    ) -> Result<i64, PipelineError> {
        let record = DetailRecord::from_payload(payload)
            .map_err(|error| PipelineError::invalid_payload(error.to_string()))?;
        let owner = payload_owner(payload).unwrap_or_else(|| fallback_owner.to_owned());
        let fetched_at = self.clock.utc();

        let entry = self
            .archive
            .archive(&owner, record.activity_id, fetched_at, payload)
            .map_err(map_archive_error)?;
        debug!(activity_id = record.activity_id, archive_entry = %entry, "archived raw detail");

        self.repository
            .upsert_detail(&record, fetched_at)
            .await
            .map_err(map_repository_error)?;
        Ok(record.activity_id)
    }

    /// Re-merge the newest archived payload of every activity.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] when the archive cannot be read or a
    /// merge fails. Unparseable archive entries are skipped with a warning.
    pub async fn replay(&self) -> Result<ReplayReport, PipelineError> {
        let payloads = self.archive.latest_payloads().map_err(map_archive_error)?;
        let mut report = ReplayReport::default();
        let fetched_at = self.clock.utc();

        for archived in payloads {
            let record = match DetailRecord::from_payload(&archived.payload) {
                Ok(record) => record,
                Err(error) => {
                    warn!(entry = %archived.name, %error, "skipping unparseable archived detail");
                    report.skipped += 1;
                    continue;
                }
            };
            self.repository
                .upsert_detail(&record, fetched_at)
                .await
                .map_err(map_repository_error)?;
            report.merged += 1;
        }

        info!(merged = report.merged, skipped = report.skipped, "detail replay finished");
        Ok(report)
    }
}

fn payload_owner(payload: &Value) -> Option<String> {
    payload
        .get("athlete")
        .and_then(|athlete| athlete.get("id"))
        .and_then(crate::domain::records::value_as_i64)
        .map(|id| id.to_string())
}

fn map_archive_error(error: DetailArchiveError) -> PipelineError {
    PipelineError::storage(error.to_string())
}

fn map_repository_error(error: DetailRepositoryError) -> PipelineError {
    PipelineError::storage(error.to_string())
}
