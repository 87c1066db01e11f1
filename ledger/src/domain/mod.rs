//! Domain services and the ports they drive.
//!
//! Services depend only on the traits in [`ports`]; adapters in
//! `crate::outbound` implement them and `crate::inbound` wires the two
//! together.

pub mod backlog;
pub mod compaction;
pub mod detail;
pub mod enrichment;
mod error;
pub mod pacing;
pub mod ports;
pub mod pull;
pub mod rate_budget;
pub mod records;
pub mod token_broker;

pub use self::backlog::{BacklogItem, BacklogQuery, BacklogSelector, RecencyFilter};
pub use self::compaction::{CompactionEngine, CompactionReport};
pub use self::detail::{DetailPersister, DetailRecord, ReplayReport};
pub use self::enrichment::{DetailFetcher, EnrichmentOutcome, EnrichmentRequest, EnrichmentSummary};
pub use self::error::PipelineError;
pub use self::pacing::PacingRuntime;
pub use self::pull::{ActivityPull, PullReport, PullRequest};
pub use self::rate_budget::{RateBudget, WindowPair};
pub use self::token_broker::{AuthorizedSession, TokenBroker};
