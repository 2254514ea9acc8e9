use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Sibling temp file used while replacing `path` (`history.json` -> `history.json.tmp`).
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `contents` to a temp file, fsync it, then rename over `path`.
///
/// Readers only ever observe the previous version or the complete new one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    write_atomic_with(path, contents, false)
}

/// Same as [`write_atomic`] but the file is readable by the owner only.
pub fn write_atomic_private(path: &Path, contents: &[u8]) -> Result<()> {
    write_atomic_with(path, contents, true)
}

fn write_atomic_with(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let tmp = tmp_path(path);

    let written = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        if private {
            restrict_permissions(&file)?;
        }
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(ChatError::storage(&tmp, e));
    }

    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ChatError::storage(path, e)
    })
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> io::Result<()> {
    Ok(())
}

pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &contents)
}

/// Read and parse a JSON file. A missing file is `Ok(None)`; a file that
/// exists but cannot be parsed is a storage error, never silently defaulted.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let contents = match fs::read(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ChatError::storage(path, e)),
    };

    serde_json::from_slice(&contents)
        .map(Some)
        .map_err(|e| ChatError::storage(path, io::Error::new(io::ErrorKind::InvalidData, e)))
}
