//! Compaction and backlog selection over the file and SQLite adapters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::BigInt;
use ledger::domain::compaction::{CANONICAL_PART, CANONICAL_TABLE, DedupKey};
use ledger::domain::ports::{AnalyticStore, DetailRepository, ShardStore};
use ledger::domain::{BacklogQuery, BacklogSelector, CompactionEngine, DetailRecord, RecencyFilter};
use ledger::outbound::canonical_dir::CanonicalDir;
use ledger::outbound::landing::ShardFiles;
use ledger::outbound::persistence::{DieselAnalyticStore, DieselDetailRepository, Warehouse};
use ledger::test_support::{MutableClock, record};
use rstest::rstest;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Pipeline {
    _root: TempDir,
    canonical_path: PathBuf,
    database_path: PathBuf,
    shards: Arc<ShardFiles>,
    analytic: Arc<DieselAnalyticStore>,
    details: Arc<DieselDetailRepository>,
    clock: Arc<MutableClock>,
}

impl Pipeline {
    async fn open() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let canonical_path = root.path().join("canonical");
        let database_path = root.path().join("warehouse.sqlite3");
        let warehouse = Warehouse::open(&database_path).await.expect("warehouse opens");
        Self {
            shards: Arc::new(ShardFiles::open(root.path().join("activities")).expect("landing dir")),
            analytic: Arc::new(DieselAnalyticStore::new(warehouse.clone())),
            details: Arc::new(DieselDetailRepository::new(warehouse)),
            clock: Arc::new(MutableClock::new(at(2024, 6, 1))),
            canonical_path,
            database_path,
            _root: root,
        }
    }

    fn land(&self, fetched_at: DateTime<Utc>, rows: Vec<Value>) -> String {
        let records: Vec<_> = rows.into_iter().map(record).collect();
        self.shards
            .write_shard("7", fetched_at, &records)
            .expect("shard lands")
    }

    fn engine(&self) -> CompactionEngine {
        let tables = CanonicalDir::open(&self.canonical_path).expect("canonical dir");
        CompactionEngine::new(
            self.shards.clone(),
            Arc::new(tables),
            self.analytic.clone(),
            self.clock.clone(),
        )
    }

    fn selector(&self) -> BacklogSelector {
        BacklogSelector::new(
            self.analytic.clone(),
            self.shards.clone(),
            self.details.clone(),
            self.clock.clone(),
        )
    }

    fn canonical_part(&self) -> PathBuf {
        self.canonical_path.join(CANONICAL_TABLE).join(CANONICAL_PART)
    }

    fn count(&self, query: &str) -> i64 {
        count_rows(&self.database_path, query)
    }
}

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn count_rows(database: &Path, query: &str) -> i64 {
    let url = database.to_str().expect("utf-8 path");
    let mut connection = SqliteConnection::establish(url).expect("sqlite connects");
    diesel::select(sql::<BigInt>(&format!("({query})")))
        .get_result(&mut connection)
        .expect("count query runs")
}

fn land_overlapping_pulls(pipeline: &Pipeline) {
    pipeline.land(
        at(2024, 5, 30),
        vec![
            json!({"id": 1, "athlete_id": 7, "start_date": "2024-05-20T07:00:00Z", "updated_at": "2024-05-20T08:00:00Z", "name": "Tempo"}),
            json!({"id": 2, "athlete_id": 7, "start_date": "2024-05-28T07:00:00Z", "updated_at": "2024-05-28T08:00:00Z", "name": "Draft"}),
        ],
    );
    pipeline.land(
        at(2024, 5, 31),
        vec![
            json!({"id": 2, "athlete_id": 7, "start_date": "2024-05-28T07:00:00Z", "updated_at": "2024-05-30T08:00:00Z", "name": "Long Run"}),
            json!({"id": 3, "athlete_id": 7, "start_date": "2024-03-01T07:00:00Z", "updated_at": "2024-03-01T08:00:00Z", "name": "Old"}),
        ],
    );
}

#[rstest]
#[tokio::test]
async fn publishes_deduplicated_rows_to_disk_and_sqlite() {
    let pipeline = Pipeline::open().await;
    land_overlapping_pulls(&pipeline);

    let report = pipeline
        .engine()
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("shards were landed");

    assert_eq!(report.shard_count, 2);
    assert_eq!(report.input_rows, 4);
    assert_eq!(report.output_rows, 3);
    assert_eq!(report.dedup_key, DedupKey::OwnerAndRecord);

    let part = std::fs::read_to_string(pipeline.canonical_part()).expect("part is published");
    let names: Vec<Value> = part
        .lines()
        .map(|line| serde_json::from_str::<Value>(line).expect("json line")["name"].clone())
        .collect();
    assert_eq!(names.len(), 3);
    assert!(names.contains(&json!("Long Run")));
    assert!(!names.contains(&json!("Draft")));

    assert_eq!(pipeline.count("SELECT COUNT(*) FROM activities"), 3);
    assert_eq!(pipeline.count("SELECT COUNT(*) FROM canonical_publications"), 1);
    let candidates = pipeline
        .analytic
        .canonical_candidates()
        .await
        .expect("candidates read")
        .expect("a publication exists");
    let mut ids: Vec<i64> = candidates.iter().map(|c| c.activity_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[rstest]
#[tokio::test]
async fn recompaction_is_idempotent() {
    let pipeline = Pipeline::open().await;
    land_overlapping_pulls(&pipeline);

    pipeline.engine().compact().await.expect("first run");
    let first = std::fs::read(pipeline.canonical_part()).expect("first part");
    pipeline.engine().compact().await.expect("second run");
    let second = std::fs::read(pipeline.canonical_part()).expect("second part");

    assert_eq!(first, second);
    assert_eq!(pipeline.count("SELECT COUNT(*) FROM gold_activities"), 3);
    assert_eq!(pipeline.count("SELECT COUNT(*) FROM canonical_publications"), 2);
    let leftovers: Vec<_> = std::fs::read_dir(&pipeline.canonical_path)
        .expect("canonical dir lists")
        .map(|entry| entry.expect("entry").file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from(CANONICAL_TABLE)]);
}

#[rstest]
#[tokio::test]
async fn backlog_reads_the_canonical_table_and_skips_enriched_rows() {
    let pipeline = Pipeline::open().await;
    land_overlapping_pulls(&pipeline);
    pipeline.engine().compact().await.expect("compaction succeeds");
    let enriched = DetailRecord::from_payload(&json!({"id": 1})).expect("detail record");
    pipeline
        .details
        .upsert_detail(&enriched, at(2024, 6, 1))
        .await
        .expect("detail stored");

    let recent = pipeline
        .selector()
        .select(&BacklogQuery::default())
        .await
        .expect("backlog selects");
    let everything = pipeline
        .selector()
        .select(&BacklogQuery {
            recency: RecencyFilter::All,
            explicit_ids: None,
        })
        .await
        .expect("backlog selects");

    let ids = |items: &[ledger::domain::BacklogItem]| -> Vec<i64> {
        items.iter().map(|item| item.activity_id).collect()
    };
    assert_eq!(ids(&recent), vec![2]);
    assert_eq!(ids(&everything), vec![2, 3]);
}

#[rstest]
#[tokio::test]
async fn backlog_falls_back_to_landed_shards_before_compaction() {
    let pipeline = Pipeline::open().await;
    land_overlapping_pulls(&pipeline);

    let backlog = pipeline
        .selector()
        .select(&BacklogQuery {
            recency: RecencyFilter::All,
            explicit_ids: None,
        })
        .await
        .expect("backlog selects");

    let ids: Vec<i64> = backlog.iter().map(|item| item.activity_id).collect();
    assert_eq!(ids, vec![2, 1, 3]);
}
