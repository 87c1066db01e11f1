//! Driven port for append-only landing of raw activity batches.

use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::records::RawRecord;

/// A landed batch read back for compaction or backlog fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    /// Shard identity; sorts in landing order.
    pub name: String,
    /// Records in landing order.
    pub records: Vec<RawRecord>,
}

define_port_error! {
    /// Errors raised by the landing store.
    pub enum ShardStoreError {
        /// Filesystem access failed.
        Io { path: String, message: String } =>
            "landing io failed at {path}: {message}",
        /// A shard file did not hold a JSON array of objects.
        Corrupt { name: String, message: String } =>
            "landed shard {name} is unreadable: {message}",
    }
}

/// Append-only shard writer and reader. Existing shards are never modified.
#[cfg_attr(test, mockall::automock)]
pub trait ShardStore: Send + Sync {
    /// Land a new immutable shard and return its name.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError::Io`] when the shard cannot be written.
    fn write_shard(
        &self,
        owner: &str,
        fetched_at: DateTime<Utc>,
        records: &[RawRecord],
    ) -> Result<String, ShardStoreError>;

    /// List landed shard names in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError::Io`] when the landing area cannot be read.
    fn list_shards(&self) -> Result<Vec<String>, ShardStoreError>;

    /// Read one shard by name.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError::Corrupt`] when the shard cannot be decoded.
    fn read_shard(&self, name: &str) -> Result<Shard, ShardStoreError>;
}
