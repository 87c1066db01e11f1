//! Canonical table directory backed by cap-std.
//!
//! Tables are subdirectories holding data parts. Staging, backup, and the
//! published table are siblings so every swap is a same-directory rename.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cap_std::fs::Dir;

use crate::domain::ports::{TableDirectory, TableDirectoryError};
use crate::outbound::files::{ignore_not_found, open_dir_all};

/// Table directory rooted at one filesystem path.
pub struct CanonicalDir {
    dir: Dir,
    path: PathBuf,
}

impl CanonicalDir {
    /// Open (creating when needed) the canonical directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TableDirectoryError::Io`] when the directory cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TableDirectoryError> {
        let path = path.into();
        let dir = open_dir_all(&path).map_err(|error| io_error(&path, error))?;
        Ok(Self { dir, path })
    }
}

impl TableDirectory for CanonicalDir {
    fn entries(&self) -> Result<Vec<String>, TableDirectoryError> {
        let mut names = Vec::new();
        let entries = self.dir.entries().map_err(|error| io_error(&self.path, error))?;
        for entry in entries {
            let entry = entry.map_err(|error| io_error(&self.path, error))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.dir.exists(name)
    }

    fn create_table(&self, name: &str) -> Result<(), TableDirectoryError> {
        self.dir
            .create_dir(name)
            .map_err(|error| io_error(&self.path.join(name), error))
    }

    fn write_part(&self, table: &str, part: &str, bytes: &[u8]) -> Result<(), TableDirectoryError> {
        let relative = Path::new(table).join(part);
        let written = self.dir.create(&relative).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });
        written.map_err(|error| io_error(&self.path.join(&relative), error))
    }

    fn rename(&self, from: &str, to: &str) -> Result<(), TableDirectoryError> {
        if self.dir.exists(to) {
            return Err(TableDirectoryError::io(
                self.path.join(to).display().to_string(),
                "target already exists",
            ));
        }
        self.dir
            .rename(from, &self.dir, to)
            .map_err(|error| io_error(&self.path.join(from), error))
    }

    fn remove_all(&self, name: &str) -> Result<(), TableDirectoryError> {
        let result = if self.dir.is_dir(name) {
            self.dir.remove_dir_all(name)
        } else {
            self.dir.remove_file(name)
        };
        ignore_not_found(result).map_err(|error| io_error(&self.path.join(name), error))
    }
}

fn io_error(path: &Path, error: io::Error) -> TableDirectoryError {
    TableDirectoryError::io(path.display().to_string(), error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_swap_by_rename_and_never_clobber() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = CanonicalDir::open(root.path().join("canonical")).expect("open");

        dir.create_table("staging").expect("create staging");
        dir.write_part("staging", "part-00000.jsonl", b"{}\n").expect("write part");
        dir.create_table("activities").expect("create live");

        let clobber = dir.rename("staging", "activities");
        assert!(clobber.is_err(), "rename onto a live table must fail");

        dir.remove_all("activities").expect("remove live");
        dir.rename("staging", "activities").expect("swap");

        assert_eq!(dir.entries().expect("entries"), vec!["activities"]);
        let part = root.path().join("canonical/activities/part-00000.jsonl");
        assert_eq!(std::fs::read(part).expect("read"), b"{}\n");
    }

    #[test]
    fn parts_replace_prior_content_and_need_their_table() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = CanonicalDir::open(root.path()).expect("open");

        let orphan = dir.write_part("missing", "part-00000.jsonl", b"{}\n");
        assert!(orphan.is_err(), "parts are only written into existing tables");

        dir.create_table("staging").expect("create staging");
        dir.write_part("staging", "part-00000.jsonl", b"{\"id\":1}\n{\"id\":2}\n")
            .expect("first write");
        dir.write_part("staging", "part-00000.jsonl", b"{\"id\":3}\n")
            .expect("second write");

        let part = root.path().join("staging/part-00000.jsonl");
        assert_eq!(std::fs::read(part).expect("read"), b"{\"id\":3}\n");
    }

    #[test]
    fn removing_missing_entries_succeeds() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = CanonicalDir::open(root.path()).expect("open");

        dir.remove_all("never-existed").expect("missing is fine");
        assert!(!dir.exists("never-existed"));
    }
}
