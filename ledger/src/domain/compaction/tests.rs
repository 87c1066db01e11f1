//! Unit tests for the compaction engine and its publish protocol.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::{
    BACKUP_PREFIX, CANONICAL_PART, CANONICAL_TABLE, CompactionEngine, DedupKey, STAGING_PREFIX,
};
use crate::domain::PipelineError;
use crate::test_support::{
    InMemoryAnalyticStore, InMemoryShardStore, InMemoryTableDirectory, MutableClock, record,
};

struct Harness {
    shards: Arc<InMemoryShardStore>,
    tables: Arc<InMemoryTableDirectory>,
    analytic: Arc<InMemoryAnalyticStore>,
    engine: CompactionEngine,
}

impl Harness {
    fn land(&self, name: &str, rows: Vec<Value>) {
        self.shards
            .insert(name, rows.into_iter().map(record).collect());
    }

    fn canonical_lines(&self) -> Vec<Value> {
        let bytes = self
            .tables
            .part(CANONICAL_TABLE, CANONICAL_PART)
            .expect("canonical part exists");
        String::from_utf8(bytes)
            .expect("utf-8 part")
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }
}

#[fixture]
fn harness() -> Harness {
    let shards = Arc::new(InMemoryShardStore::default());
    let tables = Arc::new(InMemoryTableDirectory::default());
    let analytic = Arc::new(InMemoryAnalyticStore::default());
    let clock = Arc::new(MutableClock::new(
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .expect("valid time"),
    ));
    let engine = CompactionEngine::new(shards.clone(), tables.clone(), analytic.clone(), clock);
    Harness {
        shards,
        tables,
        analytic,
        engine,
    }
}

fn land_three_versions(harness: &Harness) {
    harness.land(
        "activities_7_20240101000000.json",
        vec![json!({"id": 42, "athlete_id": 7, "updated_at": "2024-01-01T00:00:00Z", "name": "first"})],
    );
    harness.land(
        "activities_7_20240102000000.json",
        vec![json!({"id": 42, "athlete_id": 7, "updated_at": "2024-03-01T00:00:00Z", "name": "latest"})],
    );
    harness.land(
        "activities_7_20240103000000.json",
        vec![json!({"id": 42, "athlete_id": 7, "updated_at": "2024-02-01T00:00:00Z", "name": "middle"})],
    );
}

#[rstest]
#[tokio::test]
async fn no_shards_is_a_no_op(harness: Harness) {
    let report = harness.engine.compact().await.expect("compaction succeeds");

    assert!(report.is_none());
    assert!(harness.tables.table_names().is_empty());
    assert!(harness.analytic.publication().is_none());
}

#[rstest]
#[tokio::test]
async fn collapses_versions_to_the_freshest_row(harness: Harness) {
    land_three_versions(&harness);

    let report = harness
        .engine
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("shards were landed");

    assert_eq!(report.shard_count, 3);
    assert_eq!(report.input_rows, 3);
    assert_eq!(report.output_rows, 1);
    assert_eq!(report.dedup_key, DedupKey::OwnerAndRecord);
    let lines = harness.canonical_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["name"], json!("latest"));
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);

    let publication = harness.analytic.publication().expect("materialized");
    assert_eq!(publication.rows.len(), 1);
    assert_eq!(publication.rows[0].activity_id, Some(42));
    assert_eq!(publication.dedup_key_rule, "(athlete_id, id)");
}

#[rstest]
#[tokio::test]
async fn shard_without_identifier_degrades_instead_of_failing(harness: Harness) {
    land_three_versions(&harness);
    harness.land(
        "activities_7_20240104000000.json",
        vec![json!({"name": "manual entry", "distance": 5.0})],
    );

    let report = harness
        .engine
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("shards were landed");

    assert_eq!(report.dedup_key, DedupKey::Record);
    assert_eq!(report.degraded_rows, 1);
    assert_eq!(report.output_rows, 2);
    let lines = harness.canonical_lines();
    assert!(
        lines
            .iter()
            .all(|line| line.as_object().is_some_and(|row| row.contains_key("distance"))),
        "every row carries the full column union"
    );
}

#[rstest]
#[tokio::test]
async fn repeated_runs_are_byte_identical(harness: Harness) {
    land_three_versions(&harness);
    harness.land(
        "activities_8_20240105000000.json",
        vec![
            json!({"id": 1, "athlete_id": 8, "start_date": "2024-01-05T00:00:00Z"}),
            json!({"id": 2, "athlete_id": 8, "start_date": null}),
        ],
    );

    harness.engine.compact().await.expect("first run");
    let first = harness.tables.part(CANONICAL_TABLE, CANONICAL_PART);
    harness.engine.compact().await.expect("second run");
    let second = harness.tables.part(CANONICAL_TABLE, CANONICAL_PART);

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);
}

#[rstest]
#[tokio::test]
async fn failed_swap_keeps_previous_table(harness: Harness) {
    harness
        .tables
        .insert_table(CANONICAL_TABLE, &[(CANONICAL_PART, b"{\"id\":1}\n")]);
    harness.tables.fail_rename(STAGING_PREFIX, CANONICAL_TABLE);
    land_three_versions(&harness);

    let error = harness
        .engine
        .compact()
        .await
        .expect_err("publish fails");

    assert!(matches!(
        error,
        PipelineError::CompactionIntegrity { ref stage, .. } if stage == "publish"
    ));
    assert_eq!(
        harness.tables.part(CANONICAL_TABLE, CANONICAL_PART),
        Some(b"{\"id\":1}\n".to_vec())
    );
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);
    assert!(harness.analytic.publication().is_none());
}

#[rstest]
#[tokio::test]
async fn failed_materialization_rolls_back_files(harness: Harness) {
    harness
        .tables
        .insert_table(CANONICAL_TABLE, &[(CANONICAL_PART, b"{\"id\":1}\n")]);
    harness.analytic.fail_next_replace();
    land_three_versions(&harness);

    let error = harness
        .engine
        .compact()
        .await
        .expect_err("materialization fails");

    assert!(matches!(
        error,
        PipelineError::CompactionIntegrity { ref stage, .. } if stage == "materialize"
    ));
    assert_eq!(
        harness.tables.part(CANONICAL_TABLE, CANONICAL_PART),
        Some(b"{\"id\":1}\n".to_vec())
    );
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);
}

#[rstest]
#[tokio::test]
async fn restores_backup_left_by_interrupted_publish(harness: Harness) {
    let backup = format!("{BACKUP_PREFIX}20240430000000-deadbeef");
    harness
        .tables
        .insert_table(&backup, &[(CANONICAL_PART, b"{\"id\":1}\n")]);
    land_three_versions(&harness);

    let report = harness
        .engine
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("shards were landed");

    assert!(report.restored_backup);
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);
    assert_eq!(harness.canonical_lines()[0]["name"], json!("latest"));
}

#[rstest]
#[tokio::test]
async fn sweeps_orphaned_staging_directories(harness: Harness) {
    harness
        .tables
        .insert_table(CANONICAL_TABLE, &[(CANONICAL_PART, b"")]);
    harness
        .tables
        .insert_table(&format!("{STAGING_PREFIX}orphan"), &[(CANONICAL_PART, b"partial")]);
    land_three_versions(&harness);

    let report = harness
        .engine
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("shards were landed");

    assert_eq!(report.swept, 1);
    assert_eq!(harness.tables.table_names(), vec![CANONICAL_TABLE.to_owned()]);
}

#[rstest]
#[tokio::test]
async fn clusters_rows_by_owner_then_start(harness: Harness) {
    harness.land(
        "activities_7_20240101000000.json",
        vec![
            json!({"id": 3, "athlete_id": 7, "start_date": "2024-03-01T00:00:00Z"}),
            json!({"id": 1, "athlete_id": 7, "start_date": "2024-01-01T00:00:00Z"}),
        ],
    );
    harness.land(
        "activities_5_20240101000000.json",
        vec![json!({"id": 9, "athlete_id": 5, "start_date": "2024-06-01T00:00:00Z"})],
    );

    harness.engine.compact().await.expect("compaction succeeds");

    let ids: Vec<Value> = harness
        .canonical_lines()
        .iter()
        .map(|line| line["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(9), json!(1), json!(3)]);
    let ordinals: Vec<i64> = harness
        .analytic
        .publication()
        .expect("materialized")
        .rows
        .iter()
        .map(|row| row.cluster_ordinal)
        .collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}
