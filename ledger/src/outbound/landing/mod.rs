//! Filesystem adapters for landed activity batches and raw detail payloads.
//!
//! Both directories are append-only: shards and archive entries are written
//! once under unique names and never modified afterwards.

mod detail_archive;
mod shard_files;

pub use detail_archive::DetailArchiveFiles;
pub use shard_files::ShardFiles;
