//! Landing shards stored as JSON array files.

use std::path::{Path, PathBuf};

use cap_std::fs::Dir;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::ports::{Shard, ShardStore, ShardStoreError};
use crate::domain::records::RawRecord;
use crate::outbound::files::{open_dir_all, publish_new_json, visible_files};

const SHARD_PREFIX: &str = "activities_";
const SHARD_SUFFIX: &str = ".json";

/// Shard store over one landing directory.
///
/// Each pull writes `activities_{owner}_{YYYYmmddHHMMSS}.json`; a second
/// write in the same second gets a numeric suffix instead of overwriting.
pub struct ShardFiles {
    dir: Dir,
    path: PathBuf,
}

impl ShardFiles {
    /// Open (creating when needed) the landing directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ShardStoreError::Io`] when the directory cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ShardStoreError> {
        let path = path.into();
        let dir = open_dir_all(&path).map_err(|error| io_error(&path, error))?;
        Ok(Self { dir, path })
    }
}

impl ShardStore for ShardFiles {
    fn write_shard(
        &self,
        owner: &str,
        fetched_at: DateTime<Utc>,
        records: &[RawRecord],
    ) -> Result<String, ShardStoreError> {
        let stem = format!("{SHARD_PREFIX}{owner}_{}", fetched_at.format("%Y%m%d%H%M%S"));
        let bytes = serde_json::to_vec(records)
            .map_err(|error| ShardStoreError::io(stem.as_str(), error.to_string()))?;
        let name = publish_new_json(&self.dir, &stem, &bytes)
            .map_err(|error| io_error(&self.path.join(&stem), error))?;
        debug!(shard = %name, rows = records.len(), "landed shard");
        Ok(name)
    }

    fn list_shards(&self) -> Result<Vec<String>, ShardStoreError> {
        let names = visible_files(&self.dir).map_err(|error| io_error(&self.path, error))?;
        Ok(names
            .into_iter()
            .filter(|name| name.starts_with(SHARD_PREFIX) && name.ends_with(SHARD_SUFFIX))
            .collect())
    }

    fn read_shard(&self, name: &str) -> Result<Shard, ShardStoreError> {
        let bytes = self
            .dir
            .read(name)
            .map_err(|error| io_error(&self.path.join(name), error))?;
        let records = decode_records(&bytes).map_err(|message| ShardStoreError::corrupt(name, message))?;
        Ok(Shard {
            name: name.to_owned(),
            records,
        })
    }
}

fn decode_records(bytes: &[u8]) -> Result<Vec<RawRecord>, String> {
    let value: Value = serde_json::from_slice(bytes).map_err(|error| error.to_string())?;
    let Value::Array(items) = value else {
        return Err("expected a JSON array".to_owned());
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(format!("element {index} is not an object: {other}")),
        })
        .collect()
}

fn io_error(path: &Path, error: std::io::Error) -> ShardStoreError {
    ShardStoreError::io(path.display().to_string(), error.to_string())
}
