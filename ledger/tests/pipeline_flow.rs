//! Pull, compact, and enrich against on-disk adapters with a scripted API.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use ledger::domain::ports::{ClientCredentials, CredentialStore, DetailRepository};
use ledger::domain::{
    ActivityPull, BacklogSelector, CompactionEngine, DetailFetcher, DetailPersister,
    EnrichmentOutcome, EnrichmentRequest, PacingRuntime, PullRequest, TokenBroker,
};
use ledger::outbound::canonical_dir::CanonicalDir;
use ledger::outbound::credential_file::CredentialFile;
use ledger::outbound::landing::{DetailArchiveFiles, ShardFiles};
use ledger::outbound::persistence::{DieselAnalyticStore, DieselDetailRepository, Warehouse};
use ledger::test_support::strava::grant;
use ledger::test_support::{MutableClock, NoJitter, RecordingSleeper, ScriptedStravaApi};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;
use zeroize::Zeroizing;

struct Workspace {
    root: TempDir,
    api: Arc<ScriptedStravaApi>,
    clock: Arc<MutableClock>,
    sleeper: Arc<RecordingSleeper>,
    shards: Arc<ShardFiles>,
    warehouse: Warehouse,
}

impl Workspace {
    async fn open() -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(MutableClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 7, 30)
                .single()
                .expect("valid time"),
        ));
        let warehouse = Warehouse::open(root.path().join("warehouse.sqlite3"))
            .await
            .expect("warehouse opens");
        Self {
            api: Arc::new(ScriptedStravaApi::default()),
            sleeper: Arc::new(RecordingSleeper::advancing(clock.clone())),
            shards: Arc::new(ShardFiles::open(root.path().join("activities")).expect("landing")),
            clock,
            warehouse,
            root,
        }
    }

    fn token_path(&self) -> PathBuf {
        self.root.path().join("secrets/strava_token.json")
    }

    fn pacing(&self) -> PacingRuntime {
        PacingRuntime {
            sleeper: self.sleeper.clone(),
            jitter: Arc::new(NoJitter),
        }
    }

    fn broker(&self) -> TokenBroker {
        TokenBroker::new(
            self.api.clone(),
            Arc::new(CredentialFile::new(self.token_path())),
            Some(ClientCredentials {
                client_id: "1".to_owned(),
                client_secret: Zeroizing::new("secret".to_owned()),
            }),
            Some(Zeroizing::new("bootstrap".to_owned())),
            self.clock.clone(),
        )
    }

    fn pull(&self) -> ActivityPull {
        ActivityPull::new(self.api.clone(), self.broker(), self.shards.clone(), self.clock.clone())
            .with_pacing(self.pacing())
    }

    fn compaction(&self) -> CompactionEngine {
        let tables = CanonicalDir::open(self.root.path().join("canonical")).expect("canonical");
        CompactionEngine::new(
            self.shards.clone(),
            Arc::new(tables),
            Arc::new(DieselAnalyticStore::new(self.warehouse.clone())),
            self.clock.clone(),
        )
    }

    fn details(&self) -> Arc<DieselDetailRepository> {
        Arc::new(DieselDetailRepository::new(self.warehouse.clone()))
    }

    fn fetcher(&self) -> DetailFetcher {
        let details = self.details();
        let backlog = BacklogSelector::new(
            Arc::new(DieselAnalyticStore::new(self.warehouse.clone())),
            self.shards.clone(),
            details.clone(),
            self.clock.clone(),
        );
        let archive = DetailArchiveFiles::open(self.root.path().join("activity_details"))
            .expect("archive");
        let persister = DetailPersister::new(Arc::new(archive), details, self.clock.clone());
        DetailFetcher::new(backlog, self.broker(), self.api.clone(), persister, self.clock.clone())
            .with_pacing(self.pacing())
    }
}

#[rstest]
#[tokio::test]
async fn landed_activities_flow_through_to_enriched_details() {
    let workspace = Workspace::open().await;
    workspace
        .api
        .push_grant(Ok(grant("access-1", Some("rotated-1"), Some(7))));
    workspace.api.push_records(vec![
        json!({"id": 11, "name": "Intervals", "start_date": "2024-05-30T06:00:00Z"}),
        json!({"id": 12, "name": "Recovery", "start_date": "2024-05-25T06:00:00Z"}),
    ]);

    let pulled = workspace
        .pull()
        .run(&PullRequest {
            full: true,
            ..PullRequest::default()
        })
        .await
        .expect("pull succeeds");
    assert_eq!(pulled.athlete_id, 7);
    assert_eq!(pulled.landed.as_ref().map(|batch| batch.rows), Some(2));

    let stored = CredentialFile::new(workspace.token_path())
        .load()
        .expect("rotated credential saved");
    assert_eq!(stored.refresh_token.as_str(), "rotated-1");
    assert_eq!(stored.athlete_id, Some(7));

    let compacted = workspace
        .compaction()
        .compact()
        .await
        .expect("compaction succeeds")
        .expect("one shard landed");
    assert_eq!(compacted.output_rows, 2);

    let outcome = workspace
        .fetcher()
        .run(&EnrichmentRequest::default())
        .await
        .expect("enrichment succeeds");
    let EnrichmentOutcome::Completed(summary) = outcome else {
        panic!("expected a completed run, got {outcome:?}");
    };
    assert_eq!(summary.processed, 2);
    assert_eq!(workspace.api.detail_calls(), vec![11, 12]);
    assert_eq!(workspace.api.refresh_calls(), vec!["bootstrap", "rotated-1"]);
    let existing = workspace
        .details()
        .existing_ids(&[11, 12])
        .await
        .expect("lookup succeeds");
    assert_eq!(existing.len(), 2);
    assert!(workspace.sleeper.slept().is_empty());

    let again = workspace
        .fetcher()
        .run(&EnrichmentRequest::default())
        .await
        .expect("second run succeeds");
    assert_eq!(again, EnrichmentOutcome::NothingToDo);
}
