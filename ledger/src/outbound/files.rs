//! Capability-scoped file helpers shared by the filesystem adapters.

use std::io::{self, Write};
use std::path::Path;

use cap_std::{ambient_authority, fs::Dir};
use uuid::Uuid;

const TEMP_PREFIX: &str = ".tmp-";

/// Open `path` as a directory capability, creating it first when missing.
pub(crate) fn open_dir_all(path: &Path) -> io::Result<Dir> {
    Dir::create_ambient_dir_all(path, ambient_authority())?;
    Dir::open_ambient_dir(path, ambient_authority())
}

/// Replace `name` with `bytes` so readers see either the old or the new
/// contents, never a partial write.
pub(crate) fn write_atomically(dir: &Dir, name: &str, bytes: &[u8]) -> io::Result<()> {
    let temp = write_temp(dir, bytes)?;
    dir.rename(&temp, dir, name).inspect_err(|_| {
        let _cleanup = dir.remove_file(&temp);
    })
}

/// Publish `bytes` under `{stem}.json`, or `{stem}_{n}.json` when earlier
/// names are taken. Existing files are never overwritten.
///
/// Returns the name that was claimed.
pub(crate) fn publish_new_json(dir: &Dir, stem: &str, bytes: &[u8]) -> io::Result<String> {
    let temp = write_temp(dir, bytes)?;
    let result = claim_name(dir, &temp, stem);
    let _cleanup = dir.remove_file(&temp);
    result
}

fn claim_name(dir: &Dir, temp: &str, stem: &str) -> io::Result<String> {
    let mut suffix = 0_u32;
    loop {
        let name = if suffix == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}_{suffix}.json")
        };
        match dir.hard_link(temp, dir, &name) {
            Ok(()) => return Ok(name),
            Err(error) if error.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(error) => return Err(error),
        }
    }
}

fn write_temp(dir: &Dir, bytes: &[u8]) -> io::Result<String> {
    let temp = format!("{TEMP_PREFIX}{}", Uuid::new_v4().simple());
    let mut file = dir.create(&temp)?;
    let written = file.write_all(bytes).and_then(|()| file.sync_all());
    if let Err(error) = written {
        let _cleanup = dir.remove_file(&temp);
        return Err(error);
    }
    Ok(temp)
}

/// Names of regular, non-hidden files in `dir`, sorted ascending.
pub(crate) fn visible_files(dir: &Dir) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in dir.entries()? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Treat a missing entry as already removed.
pub(crate) fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
