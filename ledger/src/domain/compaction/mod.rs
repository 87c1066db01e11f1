//! Folds landed shards into one canonical, deduplicated table.
//!
//! A run discovers the column union, infers the dedup key, keeps the
//! top-ranked row per key, and publishes the result with a stage, backup, and
//! swap protocol so readers only ever see the previous or the new table.
//! Interrupted runs leave behind staging or backup directories that the next
//! run recognises by name and cleans up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::PipelineError;
use crate::domain::ports::{
    AnalyticStore, CanonicalPublication, CanonicalRow, Shard, ShardStore, TableDirectory,
    TableDirectoryError,
};
use crate::domain::records::{ID_COLUMN, OWNER_COLUMN, RawRecord, START_COLUMN, column_i64, column_timestamp};

mod dedup;
mod schema;

pub use dedup::{LandedRow, RankRule, TieBreakChain};
pub use schema::{ColumnPresence, DedupKey, DiscoveredSchema};

/// Directory name of the published canonical table.
pub const CANONICAL_TABLE: &str = "activities";
/// Single data part written inside each table directory.
pub const CANONICAL_PART: &str = "part-00000.jsonl";
/// Prefix of staging directories.
pub const STAGING_PREFIX: &str = ".staging-activities-";
/// Prefix of backup directories.
pub const BACKUP_PREFIX: &str = ".backup-activities-";

/// Outcome of one compaction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    /// Shards folded into the table.
    pub shard_count: usize,
    /// Rows read across all shards.
    pub input_rows: usize,
    /// Rows in the published table.
    pub output_rows: usize,
    /// Key used for deduplication.
    pub dedup_key: DedupKey,
    /// Rows kept under shard identity because a key column was null.
    pub degraded_rows: usize,
    /// Whether a backup from an interrupted publish was restored first.
    pub restored_backup: bool,
    /// Leftover staging or backup directories removed.
    pub swept: usize,
}

/// Canonical table compaction service.
pub struct CompactionEngine {
    shards: Arc<dyn ShardStore>,
    table_directory: Arc<dyn TableDirectory>,
    analytic_store: Arc<dyn AnalyticStore>,
    clock: Arc<dyn Clock>,
}

/// Rendered table ready to publish.
struct CompactedTable {
    report: CompactionReport,
    bytes: Vec<u8>,
    rows: Vec<CanonicalRow>,
}

impl CompactionEngine {
    /// Build an engine over the landing, canonical, and analytic ports.
    pub fn new(
        shards: Arc<dyn ShardStore>,
        table_directory: Arc<dyn TableDirectory>,
        analytic_store: Arc<dyn AnalyticStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shards,
            table_directory,
            analytic_store,
            clock,
        }
    }

    /// Run one compaction. Returns `None` when nothing has been landed yet.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Storage`] when shards cannot be read and
    /// [`PipelineError::CompactionIntegrity`] when staging, publishing, or
    /// materialization fails. On any error the canonical table is left at its
    /// previous state.
    pub async fn compact(&self) -> Result<Option<CompactionReport>, PipelineError> {
        let restored_backup = self.recover_interrupted_publish()?;

        let shards = self.load_shards()?;
        if shards.is_empty() {
            info!("no landed shards; nothing to compact");
            return Ok(None);
        }

        let published_at = self.clock.utc();
        let mut table = build_table(&shards)?;
        table.report.restored_backup = restored_backup;

        let staging = format!("{STAGING_PREFIX}{}", Uuid::new_v4().simple());
        self.stage(&staging, &table.bytes)?;
        table.report.swept = self.sweep_leftovers(&staging);

        let backup = self.publish(&staging, published_at)?;
        let publication = CanonicalPublication {
            rows: table.rows,
            dedup_key_rule: table.report.dedup_key.to_string(),
            shard_count: table.report.shard_count,
            published_at,
        };
        if let Err(error) = self.analytic_store.replace_canonical(&publication).await {
            self.roll_back_publish(backup.as_deref());
            return Err(PipelineError::compaction_integrity(
                "materialize",
                error.to_string(),
            ));
        }

        if let Some(backup) = backup {
            self.remove_quietly(&backup);
        }
        info!(
            shards = table.report.shard_count,
            input_rows = table.report.input_rows,
            output_rows = table.report.output_rows,
            dedup_key = %table.report.dedup_key,
            "canonical table published"
        );
        Ok(Some(table.report))
    }

    fn load_shards(&self) -> Result<Vec<Shard>, PipelineError> {
        let names = self
            .shards
            .list_shards()
            .map_err(|error| PipelineError::storage(error.to_string()))?;
        names
            .iter()
            .map(|name| {
                self.shards
                    .read_shard(name)
                    .map_err(|error| PipelineError::storage(error.to_string()))
            })
            .collect()
    }

    /// Restore the newest backup when a previous run died between moving the
    /// canonical table aside and moving staging into place.
    fn recover_interrupted_publish(&self) -> Result<bool, PipelineError> {
        if self.table_directory.exists(CANONICAL_TABLE) {
            return Ok(false);
        }
        let newest_backup = self
            .list_entries("recover")?
            .into_iter()
            .filter(|name| name.starts_with(BACKUP_PREFIX))
            .max();
        let Some(backup) = newest_backup else {
            return Ok(false);
        };
        self.table_directory
            .rename(&backup, CANONICAL_TABLE)
            .map_err(|error| integrity("recover", &error))?;
        warn!(backup = %backup, "restored canonical table from interrupted publish");
        Ok(true)
    }

    fn stage(&self, staging: &str, bytes: &[u8]) -> Result<(), PipelineError> {
        let written = self
            .table_directory
            .create_table(staging)
            .and_then(|()| self.table_directory.write_part(staging, CANONICAL_PART, bytes));
        if let Err(error) = written {
            self.remove_quietly(staging);
            return Err(integrity("stage", &error));
        }
        Ok(())
    }

    /// Remove staging and backup directories left by earlier runs.
    fn sweep_leftovers(&self, current_staging: &str) -> usize {
        let entries = match self.table_directory.entries() {
            Ok(entries) => entries,
            Err(error) => {
                warn!(%error, "could not list canonical directory for sweep");
                return 0;
            }
        };
        let canonical_present = self.table_directory.exists(CANONICAL_TABLE);
        entries
            .into_iter()
            .filter(|name| {
                (name.starts_with(STAGING_PREFIX) && name != current_staging)
                    || (canonical_present && name.starts_with(BACKUP_PREFIX))
            })
            .filter(|name| match self.table_directory.remove_all(name) {
                Ok(()) => {
                    info!(entry = %name, "swept leftover compaction directory");
                    true
                }
                Err(error) => {
                    warn!(entry = %name, %error, "failed to sweep leftover directory");
                    false
                }
            })
            .count()
    }

    /// Swap staging into the canonical location, returning the backup name
    /// when a previous table was moved aside.
    fn publish(
        &self,
        staging: &str,
        published_at: DateTime<Utc>,
    ) -> Result<Option<String>, PipelineError> {
        if !self.table_directory.exists(CANONICAL_TABLE) {
            if let Err(error) = self.table_directory.rename(staging, CANONICAL_TABLE) {
                self.remove_quietly(staging);
                return Err(integrity("publish", &error));
            }
            return Ok(None);
        }

        let backup = format!(
            "{BACKUP_PREFIX}{}-{}",
            published_at.format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        if let Err(error) = self.table_directory.rename(CANONICAL_TABLE, &backup) {
            self.remove_quietly(staging);
            return Err(integrity("backup", &error));
        }
        if let Err(error) = self.table_directory.rename(staging, CANONICAL_TABLE) {
            let restored = self.table_directory.rename(&backup, CANONICAL_TABLE);
            self.remove_quietly(staging);
            return Err(match restored {
                Ok(()) => integrity("publish", &error),
                Err(restore_error) => PipelineError::compaction_integrity(
                    "publish",
                    format!("{error}; restoring {backup} also failed: {restore_error}"),
                ),
            });
        }
        Ok(Some(backup))
    }

    /// Put the previous table back after a failed materialization.
    fn roll_back_publish(&self, backup: Option<&str>) {
        self.remove_quietly(CANONICAL_TABLE);
        let Some(backup) = backup else {
            return;
        };
        if let Err(error) = self.table_directory.rename(backup, CANONICAL_TABLE) {
            warn!(backup = %backup, %error, "failed to restore canonical table; next run will recover it");
        }
    }

    fn list_entries(&self, stage: &str) -> Result<Vec<String>, PipelineError> {
        self.table_directory
            .entries()
            .map_err(|error| integrity(stage, &error))
    }

    fn remove_quietly(&self, name: &str) {
        if let Err(error) = self.table_directory.remove_all(name) {
            warn!(entry = %name, %error, "failed to remove compaction directory");
        }
    }
}

fn integrity(stage: &str, error: &TableDirectoryError) -> PipelineError {
    PipelineError::compaction_integrity(stage, error.to_string())
}

fn build_table(shards: &[Shard]) -> Result<CompactedTable, PipelineError> {
    let schema = DiscoveredSchema::discover(shards);
    let key = DedupKey::infer(&schema);
    if key == DedupKey::ShardIdentity {
        warn!(
            shards = shards.len(),
            "no identifier column found; compaction will not deduplicate"
        );
    }
    let chain = TieBreakChain::for_schema(&schema);

    let rows = shards.iter().flat_map(|shard| {
        shard
            .records
            .iter()
            .enumerate()
            .map(move |(ordinal, record)| LandedRow {
                shard: &shard.name,
                ordinal,
                record,
            })
    });
    let input_rows = shards.iter().map(|shard| shard.records.len()).sum();
    let mut selection = dedup::rank_and_select(rows, key, &chain);
    if selection.degraded_rows > 0 {
        warn!(
            rows = selection.degraded_rows,
            dedup_key = %key,
            "rows with null key columns kept under shard identity"
        );
    }
    dedup::cluster(&mut selection.winners, &schema::clustering_columns(&schema));

    let mut bytes = Vec::new();
    let mut canonical_rows = Vec::with_capacity(selection.winners.len());
    for (ordinal, (dedup_key, row)) in selection.winners.iter().enumerate() {
        let widened = dedup::widen(row.record, &schema);
        let line = serde_json::to_string(&widened)
            .map_err(|error| PipelineError::compaction_integrity("render", error.to_string()))?;
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        canonical_rows.push(canonical_row(dedup_key, ordinal, &widened, line));
    }

    Ok(CompactedTable {
        report: CompactionReport {
            shard_count: shards.len(),
            input_rows,
            output_rows: canonical_rows.len(),
            dedup_key: key,
            degraded_rows: selection.degraded_rows,
            restored_backup: false,
            swept: 0,
        },
        bytes,
        rows: canonical_rows,
    })
}

fn canonical_row(dedup_key: &str, ordinal: usize, record: &RawRecord, payload: String) -> CanonicalRow {
    CanonicalRow {
        dedup_key: dedup_key.to_owned(),
        cluster_ordinal: i64::try_from(ordinal).unwrap_or(i64::MAX),
        activity_id: column_i64(record, ID_COLUMN),
        athlete_id: column_i64(record, OWNER_COLUMN),
        start_date: column_timestamp(record, START_COLUMN),
        payload,
    }
}

#[cfg(test)]
mod tests;
