//! Run-level failures surfaced by pipeline services.
//!
//! Adapters raise their own port errors; services translate them into one of
//! these variants with enough context to diagnose a failed run from its logs.

use super::ports::define_port_error;
use super::rate_budget::BudgetSnapshot;

define_port_error! {
    /// Failure taxonomy for pull, compaction, and enrichment runs.
    pub enum PipelineError {
        /// Required credentials or settings are missing. Never retried.
        Configuration { message: String } =>
            "configuration error: {message}",
        /// The API rejected the credentials. Never retried.
        Authorization { status: u16, message: String } =>
            "authorization rejected (status {status}): {message}",
        /// Rate-limit rejections outlasted the bounded retry loop.
        RateLimit { subject: String, attempts: u32, budget: BudgetSnapshot } =>
            "rate limit persisted for {subject} after {attempts} attempts ({budget})",
        /// Network failure or unexpected HTTP status.
        TransientHttp {
            context: String,
            status: Option<u16>,
            message: String,
            budget: BudgetSnapshot,
        } => "{context} failed (status {status:?}): {message} ({budget})",
        /// Staging, rename, or materialization of the canonical table failed.
        CompactionIntegrity { stage: String, message: String } =>
            "compaction {stage} failed: {message}",
        /// Landing, archive, or detail store failure.
        Storage { message: String } =>
            "storage failure: {message}",
        /// A payload lacked the fields needed to persist it.
        InvalidPayload { message: String } =>
            "invalid payload: {message}",
    }
}

impl PipelineError {
    /// Whether the failure stems from missing configuration.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}
