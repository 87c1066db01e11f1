//! Activity ledger: lands rate-limited Strava activity pulls as immutable
//! shards, folds them into one canonical table, and enriches each activity
//! with its detailed payload under the API's two-window quota.

pub mod config;
pub mod domain;
pub mod inbound;
pub mod outbound;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
