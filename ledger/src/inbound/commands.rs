//! Builds adapters from the pipeline configuration and runs one command.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mockable::{Clock, DefaultClock};
use tracing::info;

use crate::config::PipelineConfig;
use crate::domain::{
    ActivityPull, BacklogSelector, CompactionEngine, CompactionReport, DetailFetcher,
    DetailPersister, EnrichmentOutcome, PipelineError, PullReport, ReplayReport, TokenBroker,
};
use crate::domain::ports::{AnalyticStore, DetailRepository, ShardStore, StravaApi};
use crate::inbound::cli::Command;
use crate::outbound::canonical_dir::CanonicalDir;
use crate::outbound::credential_file::CredentialFile;
use crate::outbound::landing::{DetailArchiveFiles, ShardFiles};
use crate::outbound::persistence::{DieselAnalyticStore, DieselDetailRepository, Warehouse};
use crate::outbound::strava::StravaHttpClient;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// What a command produced, rendered as `key=value` lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReport {
    /// `pull` finished.
    Pulled(PullReport),
    /// `compact` finished; `None` when nothing was landed.
    Compacted(Option<CompactionReport>),
    /// `enrich` finished.
    Enriched(EnrichmentOutcome),
    /// `replay` finished.
    Replayed(ReplayReport),
}

/// Run `command` against the adapters described by `config`.
///
/// # Errors
///
/// Returns [`PipelineError::Configuration`] when a required setting is
/// missing, [`PipelineError::Storage`] when an adapter cannot be opened, and
/// any error raised by the domain service.
pub async fn execute(command: &Command, config: &PipelineConfig) -> Result<CommandReport, PipelineError> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    match command {
        Command::Pull(args) => {
            let api = strava_api(config)?;
            let broker = token_broker(config, Arc::clone(&api), Arc::clone(&clock));
            let pull = ActivityPull::new(api, broker, shard_store(config)?, clock);
            pull.run(&args.request()).await.map(CommandReport::Pulled)
        }
        Command::Compact => {
            let table_directory = CanonicalDir::open(config.layout.canonical_dir())
                .map_err(|error| PipelineError::storage(error.to_string()))?;
            let warehouse = open_warehouse(config).await?;
            let analytic_store: Arc<dyn AnalyticStore> =
                Arc::new(DieselAnalyticStore::new(warehouse));
            let engine = CompactionEngine::new(
                shard_store(config)?,
                Arc::new(table_directory),
                analytic_store,
                clock,
            );
            engine.compact().await.map(CommandReport::Compacted)
        }
        Command::Enrich(args) => {
            let api = strava_api(config)?;
            let warehouse = open_warehouse(config).await?;
            let details: Arc<dyn DetailRepository> =
                Arc::new(DieselDetailRepository::new(warehouse.clone()));
            let backlog = BacklogSelector::new(
                Arc::new(DieselAnalyticStore::new(warehouse)),
                shard_store(config)?,
                Arc::clone(&details),
                Arc::clone(&clock),
            );
            let broker = token_broker(config, Arc::clone(&api), Arc::clone(&clock));
            let persister = detail_persister(config, details, Arc::clone(&clock))?;
            let fetcher = DetailFetcher::new(backlog, broker, api, persister, clock)
                .with_configured_owner(config.athlete_id);
            fetcher.run(&args.request()).await.map(CommandReport::Enriched)
        }
        Command::Replay => {
            let warehouse = open_warehouse(config).await?;
            let persister = detail_persister(
                config,
                Arc::new(DieselDetailRepository::new(warehouse)),
                clock,
            )?;
            persister.replay().await.map(CommandReport::Replayed)
        }
    }
}

fn strava_api(config: &PipelineConfig) -> Result<Arc<dyn StravaApi>, PipelineError> {
    let client = StravaHttpClient::new(config.api_base_url.clone(), HTTP_TIMEOUT)
        .map_err(|error| PipelineError::configuration(format!("build HTTP client: {error}")))?;
    Ok(Arc::new(client))
}

fn token_broker(config: &PipelineConfig, api: Arc<dyn StravaApi>, clock: Arc<dyn Clock>) -> TokenBroker {
    TokenBroker::new(
        api,
        Arc::new(CredentialFile::new(config.layout.token_store())),
        config.credentials.clone(),
        config.bootstrap_refresh_token.clone(),
        clock,
    )
}

fn shard_store(config: &PipelineConfig) -> Result<Arc<dyn ShardStore>, PipelineError> {
    let shards = ShardFiles::open(config.layout.landing_dir())
        .map_err(|error| PipelineError::storage(error.to_string()))?;
    Ok(Arc::new(shards))
}

fn detail_persister(
    config: &PipelineConfig,
    details: Arc<dyn DetailRepository>,
    clock: Arc<dyn Clock>,
) -> Result<DetailPersister, PipelineError> {
    let archive = DetailArchiveFiles::open(config.layout.detail_archive_dir())
        .map_err(|error| PipelineError::storage(error.to_string()))?;
    Ok(DetailPersister::new(Arc::new(archive), details, clock))
}

async fn open_warehouse(config: &PipelineConfig) -> Result<Warehouse, PipelineError> {
    let path = config.layout.database_path();
    let warehouse = Warehouse::open(&path)
        .await
        .map_err(|error| PipelineError::storage(error.to_string()))?;
    info!(path = %path.display(), "opened warehouse");
    Ok(warehouse)
}

impl fmt::Display for CommandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pulled(report) => {
                writeln!(f, "athlete_id={}", report.athlete_id)?;
                match report.after {
                    Some(after) => writeln!(f, "after={after}")?,
                    None => writeln!(f, "after=full")?,
                }
                let landed = report.landed.as_ref();
                writeln!(f, "landed_shard={}", landed.map_or("none", |batch| batch.shard.as_str()))?;
                writeln!(f, "landed_rows={}", landed.map_or(0, |batch| batch.rows))?;
                let refreshed = report.refreshed.as_ref();
                writeln!(
                    f,
                    "refresh_shard={}",
                    refreshed.map_or("none", |batch| batch.shard.as_str())
                )?;
                write!(f, "refresh_rows={}", refreshed.map_or(0, |batch| batch.rows))
            }
            Self::Compacted(None) => write!(f, "status=nothing_landed"),
            Self::Compacted(Some(report)) => {
                writeln!(f, "status=published")?;
                writeln!(f, "shards={}", report.shard_count)?;
                writeln!(f, "input_rows={}", report.input_rows)?;
                writeln!(f, "output_rows={}", report.output_rows)?;
                writeln!(f, "dedup_key={}", report.dedup_key)?;
                writeln!(f, "degraded_rows={}", report.degraded_rows)?;
                writeln!(f, "restored_backup={}", report.restored_backup)?;
                write!(f, "swept={}", report.swept)
            }
            Self::Enriched(EnrichmentOutcome::NothingToDo) => write!(f, "status=nothing_to_do"),
            Self::Enriched(EnrichmentOutcome::Planned { candidates }) => {
                writeln!(f, "status=dry_run")?;
                writeln!(f, "candidates={}", candidates.len())?;
                let ids = candidates
                    .iter()
                    .map(|item| item.activity_id.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                write!(f, "activity_ids={ids}")
            }
            Self::Enriched(EnrichmentOutcome::Completed(summary)) => {
                writeln!(f, "status=completed")?;
                writeln!(f, "candidates={}", summary.candidates)?;
                writeln!(f, "processed={}", summary.processed)?;
                writeln!(f, "reached_cap={}", summary.reached_cap)?;
                write!(f, "budget={}", summary.budget)
            }
            Self::Replayed(report) => {
                writeln!(f, "merged={}", report.merged)?;
                write!(f, "skipped={}", report.skipped)
            }
        }
    }
}
