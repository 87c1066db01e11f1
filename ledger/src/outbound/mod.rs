//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **strava**: reqwest client for the token, athlete, list, and detail
//!   endpoints
//! - **landing**: append-only shard and raw detail archive directories
//! - **canonical_dir**: directory holding the published canonical table
//! - **credential_file**: JSON document holding the long-lived credential
//! - **persistence**: SQLite warehouse via Diesel
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod canonical_dir;
pub mod credential_file;
pub(crate) mod files;
pub mod landing;
pub mod persistence;
pub mod strava;
