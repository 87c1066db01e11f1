//! Command-line surface.
//!
//! Per-run knobs live here as `clap` arguments and are converted into the
//! typed request structs the domain services accept. Credentials and paths
//! come from [`crate::config`] instead.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::domain::backlog::DEFAULT_RECENCY_DAYS;
use crate::domain::enrichment::DEFAULT_SLEEP_FLOOR;
use crate::domain::pull::{DEFAULT_REFRESH_DAYS, MAX_PAGE_SIZE};
use crate::domain::rate_budget::DEFAULT_CUSHIONS;
use crate::domain::{BacklogQuery, EnrichmentRequest, PullRequest, RecencyFilter, WindowPair};

/// `ledger` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ledger",
    about = "Land, compact, and enrich Strava activities under the API rate limit",
    version
)]
pub struct Cli {
    /// Pipeline step to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Pipeline steps.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Land new activity pages as an immutable shard.
    Pull(PullArgs),
    /// Fold landed shards into the canonical table.
    Compact,
    /// Fetch detail for canonical activities that lack it.
    Enrich(EnrichArgs),
    /// Re-merge archived detail payloads without calling the API.
    Replay,
}

/// `ledger pull` arguments.
#[derive(Debug, Clone, Args)]
pub struct PullArgs {
    /// Ignore landed shards and pull the full history.
    #[arg(long = "all")]
    pub all: bool,
    /// Activities per page.
    #[arg(
        long = "per-page",
        value_name = "n",
        default_value_t = MAX_PAGE_SIZE,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_PAGE_SIZE))
    )]
    pub per_page: u32,
    /// Days re-pulled to refresh evolving fields; 0 disables.
    #[arg(long = "refresh-days", value_name = "days", default_value_t = DEFAULT_REFRESH_DAYS)]
    pub refresh_days: u32,
}

impl PullArgs {
    /// Build the pull request.
    pub fn request(&self) -> PullRequest {
        PullRequest {
            full: self.all,
            per_page: self.per_page,
            refresh_days: self.refresh_days,
            ..PullRequest::default()
        }
    }
}

/// `ledger enrich` arguments.
#[derive(Debug, Clone, Args)]
pub struct EnrichArgs {
    /// Consider every canonical activity regardless of start time.
    #[arg(long = "all", conflicts_with = "since_days")]
    pub all: bool,
    /// Only consider activities started within this many days.
    #[arg(long = "since-days", value_name = "days")]
    pub since_days: Option<u32>,
    /// Request segment efforts with each detail.
    #[arg(long = "include-efforts")]
    pub include_efforts: bool,
    /// Stop after this many successful detail calls.
    #[arg(long = "max-calls", value_name = "n")]
    pub max_calls: Option<u32>,
    /// Enrich exactly these activity ids.
    #[arg(long = "ids", value_name = "a,b,c", value_delimiter = ',')]
    pub ids: Vec<i64>,
    /// Minimum pause after a rate rejection.
    #[arg(long = "sleep-floor-seconds", value_name = "seconds", default_value_t = DEFAULT_SLEEP_FLOOR.as_secs())]
    pub sleep_floor_seconds: u64,
    /// Select and authorize, but fetch nothing.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Calls held back from the 15-minute window.
    #[arg(long = "cushion-short", value_name = "n", default_value_t = DEFAULT_CUSHIONS.short)]
    pub cushion_short: u32,
    /// Calls held back from the daily window.
    #[arg(long = "cushion-long", value_name = "n", default_value_t = DEFAULT_CUSHIONS.long)]
    pub cushion_long: u32,
}

impl EnrichArgs {
    /// Build the enrichment request.
    pub fn request(&self) -> EnrichmentRequest {
        let recency = if self.all {
            RecencyFilter::All
        } else {
            RecencyFilter::SinceDays(self.since_days.unwrap_or(DEFAULT_RECENCY_DAYS))
        };
        let explicit_ids = (!self.ids.is_empty()).then(|| self.ids.clone());
        EnrichmentRequest {
            query: BacklogQuery {
                recency,
                explicit_ids,
            },
            include_efforts: self.include_efforts,
            max_calls: self.max_calls,
            sleep_floor: Duration::from_secs(self.sleep_floor_seconds),
            dry_run: self.dry_run,
            cushion: WindowPair::new(self.cushion_short, self.cushion_long),
            ..EnrichmentRequest::default()
        }
    }
}
