//! Test utilities for the ledger crate.
//!
//! Shared doubles for unit tests (in `src/`) and integration tests (in
//! `tests/`). Compiled for tests or with the `test-support` feature.

pub mod pacing;
pub mod stores;
pub mod strava;

pub use pacing::{MutableClock, NoJitter, RecordingSleeper};
pub use stores::{
    InMemoryAnalyticStore, InMemoryCredentialStore, InMemoryDetailArchive,
    InMemoryDetailRepository, InMemoryShardStore, InMemoryTableDirectory,
};
pub use strava::ScriptedStravaApi;

use serde_json::Value;

use crate::domain::records::RawRecord;

/// Convert a `json!` object literal into a [`RawRecord`].
///
/// # Panics
///
/// Panics when `value` is not a JSON object.
pub fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}
