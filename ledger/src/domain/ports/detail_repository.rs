//! Driven port for the structured activity detail store.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::detail::DetailRecord;

define_port_error! {
    /// Errors raised by the detail store.
    pub enum DetailRepositoryError {
        /// Connection to the store failed.
        Connection { message: String } =>
            "detail store connection failed: {message}",
        /// A query or write failed.
        Query { message: String } =>
            "detail store query failed: {message}",
    }
}

/// Replace-semantics store of detail records keyed by activity id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DetailRepository: Send + Sync {
    /// Return the subset of `candidates` that already have a detail row.
    async fn existing_ids(&self, candidates: &[i64]) -> Result<BTreeSet<i64>, DetailRepositoryError>;

    /// Replace the record and its child collections in one transaction.
    ///
    /// Child collections set to `None` on the record are left untouched.
    async fn upsert_detail(
        &self,
        record: &DetailRecord,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), DetailRepositoryError>;
}
