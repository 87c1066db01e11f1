//! Driven port for the raw detail payload archive.
//!
//! Every fetched payload is written here before the structured merge so a
//! crash between the two steps can be repaired by replay without re-fetching.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::define_port_error;

/// Newest archived payload for one activity.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedPayload {
    /// Activity identifier encoded in the archive name.
    pub activity_id: i64,
    /// Archive entry name.
    pub name: String,
    /// Raw payload as fetched.
    pub payload: Value,
}

define_port_error! {
    /// Errors raised by the detail archive.
    pub enum DetailArchiveError {
        /// Filesystem access failed.
        Io { path: String, message: String } =>
            "detail archive io failed at {path}: {message}",
        /// An archive entry could not be decoded.
        Corrupt { name: String, message: String } =>
            "archived detail {name} is unreadable: {message}",
    }
}

/// Append-only archive of raw detail payloads.
#[cfg_attr(test, mockall::automock)]
pub trait DetailArchive: Send + Sync {
    /// Write one raw payload and return the archive entry name.
    ///
    /// # Errors
    ///
    /// Returns [`DetailArchiveError::Io`] when the payload cannot be written.
    fn archive(
        &self,
        owner: &str,
        activity_id: i64,
        fetched_at: DateTime<Utc>,
        payload: &Value,
    ) -> Result<String, DetailArchiveError>;

    /// Return the newest archived payload per activity, ordered by activity id.
    ///
    /// # Errors
    ///
    /// Returns an error when the archive cannot be listed or decoded.
    fn latest_payloads(&self) -> Result<Vec<ArchivedPayload>, DetailArchiveError>;
}
