//! Driven port for the queryable analytic store.
//!
//! Compaction materializes the canonical table here; backlog selection reads
//! candidate identifiers back out of it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;

/// One canonical row prepared for materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRow {
    /// Rendered dedup key; unique within a publication.
    pub dedup_key: String,
    /// Position under the clustering order.
    pub cluster_ordinal: i64,
    /// Activity identifier, when the record has one.
    pub activity_id: Option<i64>,
    /// Owner identifier, when the record has one.
    pub athlete_id: Option<i64>,
    /// Event start time, when parseable.
    pub start_date: Option<DateTime<Utc>>,
    /// Full record as JSON text.
    pub payload: String,
}

/// A complete replacement of the canonical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalPublication {
    /// Rows in clustering order.
    pub rows: Vec<CanonicalRow>,
    /// Human-readable description of the dedup key rule used.
    pub dedup_key_rule: String,
    /// Number of shards folded into this publication.
    pub shard_count: usize,
    /// When compaction produced the publication.
    pub published_at: DateTime<Utc>,
}

/// Backlog candidate read from the canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateActivity {
    /// Activity identifier.
    pub activity_id: i64,
    /// Event start time, when known.
    pub start_date: Option<DateTime<Utc>>,
}

define_port_error! {
    /// Errors raised by the analytic store.
    pub enum AnalyticStoreError {
        /// Connection to the store failed.
        Connection { message: String } =>
            "analytic store connection failed: {message}",
        /// A query or write failed.
        Query { message: String } =>
            "analytic store query failed: {message}",
    }
}

/// Canonical table materialization and read-back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalyticStore: Send + Sync {
    /// Replace the canonical table contents in one atomic operation.
    async fn replace_canonical(
        &self,
        publication: &CanonicalPublication,
    ) -> Result<(), AnalyticStoreError>;

    /// Return canonical candidates, or `None` if nothing was ever published.
    async fn canonical_candidates(
        &self,
    ) -> Result<Option<Vec<CandidateActivity>>, AnalyticStoreError>;
}
