//! Shared SQLite connection for the warehouse repositories.
//!
//! SQLite allows one writer at a time, so the repositories share a single
//! connection behind an async mutex instead of a pool. Queries run on Tokio's
//! blocking pool via `diesel-async`'s sync connection wrapper.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use diesel::connection::SimpleConnection;
use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;";

/// Async-capable SQLite connection type used by the repositories.
pub(crate) type WarehouseConnection = SyncConnectionWrapper<SqliteConnection>;

/// Errors raised while opening the warehouse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseError {
    /// The database file could not be opened.
    #[error("failed to open warehouse at {path}: {message}")]
    Open { path: String, message: String },

    /// Pending migrations could not be applied.
    #[error("failed to migrate warehouse at {path}: {message}")]
    Migrate { path: String, message: String },
}

impl DatabaseError {
    /// Create an open error for `path`.
    pub fn open(path: &Path, message: impl Into<String>) -> Self {
        Self::Open {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Create a migration error for `path`.
    pub fn migrate(path: &Path, message: impl Into<String>) -> Self {
        Self::Migrate {
            path: path.display().to_string(),
            message: message.into(),
        }
    }
}

/// Handle to the migrated warehouse database.
#[derive(Clone)]
pub struct Warehouse {
    connection: Arc<Mutex<WarehouseConnection>>,
}

impl Warehouse {
    /// Open the database at `path`, creating the file and parent directory
    /// when missing, and apply pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Open`] when the file cannot be opened and
    /// [`DatabaseError::Migrate`] when migrations fail.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let path = path.into();
        let blocking_path = path.clone();
        let connection = tokio::task::spawn_blocking(move || open_migrated(&blocking_path))
            .await
            .map_err(|error| DatabaseError::open(&path, error.to_string()))??;
        Ok(Self {
            connection: Arc::new(Mutex::new(SyncConnectionWrapper::new(connection))),
        })
    }

    /// Lock the shared connection for one unit of work.
    pub(crate) async fn connection(&self) -> MutexGuard<'_, WarehouseConnection> {
        self.connection.lock().await
    }
}

fn open_migrated(path: &Path) -> Result<SqliteConnection, DatabaseError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        cap_std::fs::Dir::create_ambient_dir_all(parent, cap_std::ambient_authority())
            .map_err(|error| DatabaseError::open(path, error.to_string()))?;
    }
    let url = path
        .to_str()
        .ok_or_else(|| DatabaseError::open(path, "path is not valid UTF-8"))?;
    let mut connection = SqliteConnection::establish(url)
        .map_err(|error| DatabaseError::open(path, error.to_string()))?;
    connection
        .batch_execute(CONNECTION_PRAGMAS)
        .map_err(|error| DatabaseError::open(path, error.to_string()))?;
    let applied = connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|error| DatabaseError::migrate(path, error.to_string()))?;
    if !applied.is_empty() {
        info!(path = %path.display(), migrations = applied.len(), "applied warehouse migrations");
    }
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn error_messages_name_the_path() {
        let error = DatabaseError::migrate(Path::new("/srv/warehouse.sqlite3"), "boom");
        assert_eq!(
            error.to_string(),
            "failed to migrate warehouse at /srv/warehouse.sqlite3: boom"
        );
    }

    #[tokio::test]
    async fn opening_twice_is_idempotent() {
        let root = tempfile::tempdir().expect("tempdir");
        let path = root.path().join("nested/warehouse.sqlite3");

        Warehouse::open(&path).await.expect("first open");
        Warehouse::open(&path).await.expect("second open");

        assert!(path.exists());
    }
}
