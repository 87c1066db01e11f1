//! Driven port for the directory holding the canonical table.
//!
//! Compaction only needs a handful of directory operations to implement its
//! stage, backup, and swap protocol; keeping them behind a port lets tests
//! inject rename failures at precise points.

use super::define_port_error;

define_port_error! {
    /// Errors raised by canonical directory operations.
    pub enum TableDirectoryError {
        /// An operation on `name` failed.
        Io { name: String, message: String } =>
            "canonical directory operation on {name} failed: {message}",
    }
}

/// Operations over top-level entries of the canonical storage directory.
#[cfg_attr(test, mockall::automock)]
pub trait TableDirectory: Send + Sync {
    /// List top-level entry names.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when the directory cannot be read.
    fn entries(&self) -> Result<Vec<String>, TableDirectoryError>;

    /// Whether a top-level entry exists.
    fn exists(&self, name: &str) -> bool;

    /// Create an empty table directory.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when creation fails.
    fn create_table(&self, name: &str) -> Result<(), TableDirectoryError>;

    /// Write one data part inside a table directory.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when the write fails.
    fn write_part(&self, table: &str, part: &str, bytes: &[u8]) -> Result<(), TableDirectoryError>;

    /// Atomically rename a top-level entry.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when the rename fails.
    fn rename(&self, from: &str, to: &str) -> Result<(), TableDirectoryError>;

    /// Remove a top-level entry and its contents. Missing entries succeed.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when removal fails.
    fn remove_all(&self, name: &str) -> Result<(), TableDirectoryError>;
}
