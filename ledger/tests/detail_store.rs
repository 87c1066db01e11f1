//! Detail persistence against the SQLite warehouse and the on-disk archive.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Nullable, Text};
use ledger::domain::ports::DetailRepository;
use ledger::domain::{DetailPersister, DetailRecord, ReplayReport};
use ledger::outbound::landing::DetailArchiveFiles;
use ledger::outbound::persistence::{DieselDetailRepository, Warehouse};
use ledger::test_support::MutableClock;
use mockable::Clock;
use rstest::rstest;
use serde_json::{Value, json};
use tempfile::TempDir;

struct Store {
    root: TempDir,
    database_path: PathBuf,
    repository: Arc<DieselDetailRepository>,
    clock: Arc<MutableClock>,
}

impl Store {
    async fn open() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let database_path = root.path().join("warehouse.sqlite3");
        let warehouse = Warehouse::open(&database_path).await.expect("warehouse opens");
        Self {
            database_path,
            repository: Arc::new(DieselDetailRepository::new(warehouse)),
            clock: Arc::new(MutableClock::new(
                Utc.with_ymd_and_hms(2024, 6, 1, 10, 7, 30)
                    .single()
                    .expect("valid time"),
            )),
            root,
        }
    }

    fn archive_path(&self) -> PathBuf {
        self.root.path().join("activity_details")
    }

    fn persister(&self) -> DetailPersister {
        let archive = DetailArchiveFiles::open(self.archive_path()).expect("archive dir");
        DetailPersister::new(Arc::new(archive), self.repository.clone(), self.clock.clone())
    }

    async fn upsert(&self, payload: Value) {
        let record = DetailRecord::from_payload(&payload).expect("detail record");
        self.repository
            .upsert_detail(&record, self.clock.utc())
            .await
            .expect("upsert succeeds");
    }

    fn count(&self, table: &str, activity_id: i64) -> i64 {
        let mut connection = connect(&self.database_path);
        diesel::select(sql::<BigInt>(&format!(
            "(SELECT COUNT(*) FROM {table} WHERE activity_id = {activity_id})"
        )))
        .get_result(&mut connection)
        .expect("count query runs")
    }

    fn name(&self, activity_id: i64) -> Option<String> {
        let mut connection = connect(&self.database_path);
        diesel::select(sql::<Nullable<Text>>(&format!(
            "(SELECT name FROM activity_details WHERE activity_id = {activity_id})"
        )))
        .get_result(&mut connection)
        .expect("name query runs")
    }
}

fn connect(database: &Path) -> SqliteConnection {
    let url = database.to_str().expect("utf-8 path");
    SqliteConnection::establish(url).expect("sqlite connects")
}

fn full_payload(name: &str) -> Value {
    json!({
        "id": 7,
        "athlete": {"id": 42},
        "name": name,
        "start_date": "2024-05-30T06:00:00Z",
        "distance": 10012.5,
        "splits_metric": [
            {"distance": 1000.0, "elapsed_time": 300, "moving_time": 298},
            {"distance": 1000.0, "elapsed_time": 305, "moving_time": 301}
        ],
        "splits_standard": [
            {"distance": 1609.3, "elapsed_time": 490, "moving_time": 488}
        ],
        "segment_efforts": [
            {"id": 9001, "segment": {"id": 55}, "name": "Hill", "elapsed_time": 120},
            {"name": "no id, dropped"}
        ]
    })
}

#[rstest]
#[tokio::test]
async fn stores_the_record_and_its_children() {
    let store = Store::open().await;

    store.upsert(full_payload("Morning Run")).await;

    assert_eq!(store.name(7).as_deref(), Some("Morning Run"));
    assert_eq!(store.count("activity_splits_metric", 7), 2);
    assert_eq!(store.count("activity_splits_standard", 7), 1);
    assert_eq!(store.count("activity_segment_efforts", 7), 1);
}

#[rstest]
#[tokio::test]
async fn absent_children_are_kept_and_empty_children_are_cleared() {
    let store = Store::open().await;
    store.upsert(full_payload("Morning Run")).await;

    store
        .upsert(json!({"id": 7, "name": "Renamed", "splits_standard": []}))
        .await;

    assert_eq!(store.name(7).as_deref(), Some("Renamed"));
    assert_eq!(store.count("activity_splits_metric", 7), 2);
    assert_eq!(store.count("activity_splits_standard", 7), 0);
    assert_eq!(store.count("activity_segment_efforts", 7), 1);
}

#[rstest]
#[tokio::test]
async fn replacing_children_drops_stale_rows() {
    let store = Store::open().await;
    store.upsert(full_payload("Morning Run")).await;

    store
        .upsert(json!({
            "id": 7,
            "splits_metric": [{"distance": 1000.0, "elapsed_time": 280}]
        }))
        .await;

    assert_eq!(store.count("activity_splits_metric", 7), 1);
}

#[rstest]
#[tokio::test]
async fn existing_ids_reports_only_stored_activities() {
    let store = Store::open().await;
    store.upsert(json!({"id": 3})).await;
    store.upsert(json!({"id": 5})).await;

    let existing = store
        .repository
        .existing_ids(&[1, 3, 5, 8])
        .await
        .expect("lookup succeeds");

    assert_eq!(existing.into_iter().collect::<Vec<_>>(), vec![3, 5]);
}

#[rstest]
#[tokio::test]
async fn persisted_payloads_are_archived_and_replayable() {
    let store = Store::open().await;
    let persister = store.persister();

    let activity_id = persister
        .persist(&full_payload("Morning Run"), "0")
        .await
        .expect("persist succeeds");
    store.clock.advance(std::time::Duration::from_secs(60));
    persister
        .persist(&full_payload("Evening Run"), "0")
        .await
        .expect("persist succeeds");

    assert_eq!(activity_id, 7);
    let archived: Vec<String> = std::fs::read_dir(store.archive_path())
        .expect("archive lists")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archived.len(), 2);
    assert!(
        archived
            .iter()
            .all(|name| name.starts_with("strava_detailed_activity_42_7_")),
        "{archived:?}"
    );

    store.upsert(json!({"id": 7, "name": "Clobbered"})).await;
    let report = persister.replay().await.expect("replay succeeds");

    assert_eq!(report, ReplayReport { merged: 1, skipped: 0 });
    assert_eq!(store.name(7).as_deref(), Some("Evening Run"));
}
