//! Credential store persisted as a single JSON document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::domain::ports::{CredentialStore, CredentialStoreError, StoredCredential};
use crate::outbound::files::{open_dir_all, write_atomically};

#[derive(Serialize, Deserialize)]
struct CredentialDocument {
    refresh_token: String,
    #[serde(default)]
    athlete_id: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    saved_at: i64,
}

/// JSON credential document at a fixed path, rewritten atomically.
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    /// Store the credential at `path`; parent directories are created on save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn split(&self) -> Option<(&Path, &str)> {
        let name = self.path.file_name()?.to_str()?;
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Some((parent, name))
    }
}

impl CredentialStore for CredentialFile {
    fn load(&self) -> Option<StoredCredential> {
        let (parent, name) = self.split()?;
        let dir = cap_std::fs::Dir::open_ambient_dir(parent, cap_std::ambient_authority()).ok()?;
        let bytes = dir.read(name).ok()?;
        let document: CredentialDocument = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "ignoring unreadable credential store");
                return None;
            }
        };
        if document.refresh_token.trim().is_empty() {
            return None;
        }
        Some(StoredCredential {
            refresh_token: Zeroizing::new(document.refresh_token),
            athlete_id: document.athlete_id,
            scope: document.scope,
            saved_at: DateTime::from_timestamp(document.saved_at, 0).unwrap_or_default(),
        })
    }

    fn save(&self, credential: &StoredCredential) -> Result<(), CredentialStoreError> {
        let path = self.path.display().to_string();
        let (parent, name) = self
            .split()
            .ok_or_else(|| CredentialStoreError::write(path.as_str(), "path has no file name"))?;
        let document = CredentialDocument {
            refresh_token: credential.refresh_token.as_str().to_owned(),
            athlete_id: credential.athlete_id,
            scope: credential.scope.clone(),
            saved_at: credential.saved_at.timestamp(),
        };
        let bytes = Zeroizing::new(
            serde_json::to_vec_pretty(&document)
                .map_err(|error| CredentialStoreError::write(path.as_str(), error.to_string()))?,
        );
        let dir = open_dir_all(parent)
            .map_err(|error| CredentialStoreError::write(path.as_str(), error.to_string()))?;
        write_atomically(&dir, name, &bytes)
            .map_err(|error| CredentialStoreError::write(path.as_str(), error.to_string()))?;
        debug!(path = %path, athlete_id = ?credential.athlete_id, "credential stored");
        Ok(())
    }
}
