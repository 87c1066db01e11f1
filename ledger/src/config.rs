//! Pipeline configuration loaded via OrthoConfig.
//!
//! Settings are read once at startup into a [`PipelineConfig`] which is then
//! passed by reference to the adapters; nothing else reads the environment.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::domain::PipelineError;
use crate::domain::ports::ClientCredentials;

/// Default Strava REST API root.
pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3/";
const DEFAULT_DATA_DIR: &str = "data";
const TOKEN_STORE_FILE: &str = "strava_token.json";

/// Raw settings read from `STRAVA_*` environment variables.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "STRAVA")]
pub struct LedgerSettings {
    /// OAuth application client identifier.
    pub client_id: Option<String>,
    /// OAuth application client secret.
    pub client_secret: Option<String>,
    /// Long-lived credential used only until the store holds one.
    pub refresh_token: Option<String>,
    /// Credential store location.
    pub token_store: Option<PathBuf>,
    /// Root of the landing, archive, canonical, and database files.
    pub data_dir: Option<PathBuf>,
    /// API root override, mainly for tests.
    pub api_base_url: Option<String>,
    /// Owner identifier used when the token grant omits one.
    pub athlete_id: Option<i64>,
}

/// On-disk locations derived from the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
    token_store: PathBuf,
}

impl DataLayout {
    /// Lay out directories under `root`; the token store defaults to
    /// `<root>/strava_token.json`.
    pub fn new(root: impl Into<PathBuf>, token_store: Option<PathBuf>) -> Self {
        let root = root.into();
        let token_store = token_store.unwrap_or_else(|| root.join(TOKEN_STORE_FILE));
        Self { root, token_store }
    }

    /// Landed activity shards.
    pub fn landing_dir(&self) -> PathBuf {
        self.root.join("activities")
    }

    /// Raw detail payload archive.
    pub fn detail_archive_dir(&self) -> PathBuf {
        self.root.join("activity_details")
    }

    /// Canonical table directory holding the published table and its
    /// staging and backup siblings.
    pub fn canonical_dir(&self) -> PathBuf {
        self.root.join("canonical")
    }

    /// SQLite analytic and detail store.
    pub fn database_path(&self) -> PathBuf {
        self.root.join("warehouse.sqlite3")
    }

    /// Credential store document.
    pub fn token_store(&self) -> &Path {
        &self.token_store
    }
}

/// Validated configuration shared by every command.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// File locations.
    pub layout: DataLayout,
    /// Client credentials, when both halves are configured.
    pub credentials: Option<ClientCredentials>,
    /// Bootstrap long-lived credential.
    pub bootstrap_refresh_token: Option<Zeroizing<String>>,
    /// API root.
    pub api_base_url: Url,
    /// Configured owner identifier.
    pub athlete_id: Option<i64>,
}

impl PipelineConfig {
    /// Read `STRAVA_*` settings from the environment and validate them.
    ///
    /// Command-line arguments belong to the CLI, so settings are loaded from
    /// the environment alone.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when settings cannot be
    /// parsed or fail validation.
    pub fn load() -> Result<Self, PipelineError> {
        let settings = LedgerSettings::load_from_iter([OsString::from("ledger")])
            .map_err(|error| PipelineError::configuration(error.to_string()))?;
        Self::from_settings(settings)
    }

    /// Validate raw settings.
    ///
    /// Missing credentials are not an error here; commands that need them
    /// fail later with a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] when the API root is not a
    /// valid URL.
    pub fn from_settings(settings: LedgerSettings) -> Result<Self, PipelineError> {
        let raw_url = settings
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned());
        let api_base_url = parse_base_url(&raw_url)?;

        let credentials = match (non_blank(settings.client_id), non_blank(settings.client_secret)) {
            (Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                client_id,
                client_secret: Zeroizing::new(client_secret),
            }),
            _ => None,
        };

        Ok(Self {
            layout: DataLayout::new(
                settings
                    .data_dir
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
                settings.token_store,
            ),
            credentials,
            bootstrap_refresh_token: non_blank(settings.refresh_token).map(Zeroizing::new),
            api_base_url,
            athlete_id: settings.athlete_id,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, PipelineError> {
    // A trailing slash keeps `Url::join` from dropping the last path segment.
    let normalised = if raw.ends_with('/') {
        raw.to_owned()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalised).map_err(|error| {
        PipelineError::configuration(format!("STRAVA_API_BASE_URL '{raw}' is invalid: {error}"))
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
