//! Writing keys and certificates without clobbering what is already there.
//!
//! An existing file is renamed aside first, then the new content goes to a
//! temporary file in the same directory which is moved over the target, so
//! a reader never sees a partial file.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::info;

use crate::error::{RequestError, Result};

const KEY_MODE: u32 = 0o600;
const CERT_MODE: u32 = 0o644;

/// Moves an existing `path` to `<path>.<unix time>.old`, adding `-N` on
/// collision. Returns the new location, or `None` if nothing was there.
pub fn rename_aside(path: &Path) -> Result<Option<PathBuf>> {
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }
    let stamp = OffsetDateTime::now_utc().unix_timestamp();
    let base = format!("{}.{stamp}", path.display());
    let mut target = PathBuf::from(format!("{base}.old"));
    let mut n = 1;
    while fs::symlink_metadata(&target).is_ok() {
        target = PathBuf::from(format!("{base}-{n}.old"));
        n += 1;
    }
    fs::rename(path, &target).map_err(|err| RequestError::file_write(path, err))?;
    info!("Renamed existing file {path:?} to {target:?}");
    Ok(Some(target))
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Writes `content` to `path` through a temporary file in the same
/// directory. Permissions are applied before any byte is written.
pub fn atomic_write(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let fail = |err| RequestError::file_write(path, err);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
    set_mode(tmp.as_file(), mode).map_err(fail)?;
    tmp.write_all(content).map_err(fail)?;
    tmp.as_file().sync_all().map_err(fail)?;
    tmp.persist(path).map_err(|err| fail(err.error))?;
    Ok(())
}

fn write_artifact(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    rename_aside(path)?;
    atomic_write(path, content, mode)
}

pub fn write_private_key(path: &Path, pem: &[u8]) -> Result<()> {
    info!("Writing key file: {path:?}");
    write_artifact(path, pem, KEY_MODE)
}

pub fn write_certificate(path: &Path, pem: &[u8]) -> Result<()> {
    info!("Writing certificate file: {path:?}");
    write_artifact(path, pem, CERT_MODE)
}

/// The output directory must exist and accept new files.
pub fn check_output_dir(dir: &Path) -> Result<()> {
    let meta = fs::metadata(dir).map_err(|err| {
        RequestError::validation(format!("output directory {dir:?} is not accessible: {err}"))
    })?;
    if !meta.is_dir() {
        return Err(RequestError::validation(format!(
            "output path {dir:?} is not a directory"
        )));
    }
    NamedTempFile::new_in(dir).map_err(|err| {
        RequestError::validation(format!("output directory {dir:?} is not writable: {err}"))
    })?;
    Ok(())
}
