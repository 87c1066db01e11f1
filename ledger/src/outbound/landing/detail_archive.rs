//! Raw detail payload archive stored as one JSON file per fetch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cap_std::fs::Dir;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::ports::{ArchivedPayload, DetailArchive, DetailArchiveError};
use crate::outbound::files::{open_dir_all, visible_files, write_atomically};

const ARCHIVE_PREFIX: &str = "strava_detailed_activity_";
const ARCHIVE_SUFFIX: &str = ".json";

/// Archive directory holding `strava_detailed_activity_{owner}_{id}_{ts}.json`
/// files.
pub struct DetailArchiveFiles {
    dir: Dir,
    path: PathBuf,
}

impl DetailArchiveFiles {
    /// Open (creating when needed) the archive directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DetailArchiveError::Io`] when the directory cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DetailArchiveError> {
        let path = path.into();
        let dir = open_dir_all(&path).map_err(|error| io_error(&path, error))?;
        Ok(Self { dir, path })
    }
}

/// Activity id and fetch stamp encoded in an archive name.
#[derive(Debug, PartialEq, Eq)]
struct ArchiveName<'a> {
    activity_id: i64,
    stamp: &'a str,
}

fn parse_archive_name(name: &str) -> Option<ArchiveName<'_>> {
    let body = name
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    // The owner segment may itself contain underscores; id and stamp never do.
    let mut parts = body.rsplitn(3, '_');
    let stamp = parts.next()?;
    let activity_id = parts.next()?.parse().ok()?;
    parts.next()?;
    Some(ArchiveName { activity_id, stamp })
}

impl DetailArchive for DetailArchiveFiles {
    fn archive(
        &self,
        owner: &str,
        activity_id: i64,
        fetched_at: DateTime<Utc>,
        payload: &Value,
    ) -> Result<String, DetailArchiveError> {
        let name = format!(
            "{ARCHIVE_PREFIX}{owner}_{activity_id}_{}{ARCHIVE_SUFFIX}",
            fetched_at.format("%Y%m%d%H%M%S")
        );
        let bytes = serde_json::to_vec(payload)
            .map_err(|error| DetailArchiveError::io(name.as_str(), error.to_string()))?;
        write_atomically(&self.dir, &name, &bytes)
            .map_err(|error| io_error(&self.path.join(&name), error))?;
        Ok(name)
    }

    fn latest_payloads(&self) -> Result<Vec<ArchivedPayload>, DetailArchiveError> {
        let names = visible_files(&self.dir).map_err(|error| io_error(&self.path, error))?;

        let mut latest: BTreeMap<i64, (String, String)> = BTreeMap::new();
        for name in &names {
            let Some(parsed) = parse_archive_name(name) else {
                continue;
            };
            let candidate = (parsed.stamp.to_owned(), name.clone());
            latest
                .entry(parsed.activity_id)
                .and_modify(|current| {
                    if candidate > *current {
                        *current = candidate.clone();
                    }
                })
                .or_insert_with(|| candidate.clone());
        }

        latest
            .into_iter()
            .map(|(activity_id, (_, name))| {
                let bytes = self
                    .dir
                    .read(&name)
                    .map_err(|error| io_error(&self.path.join(&name), error))?;
                let payload = serde_json::from_slice(&bytes).map_err(|error| {
                    DetailArchiveError::corrupt(name.as_str(), error.to_string())
                })?;
                Ok(ArchivedPayload {
                    activity_id,
                    name,
                    payload,
                })
            })
            .collect()
    }
}

fn io_error(path: &Path, error: std::io::Error) -> DetailArchiveError {
    DetailArchiveError::io(path.display().to_string(), error.to_string())
}
