//! Write-to-temp-and-rename helpers
//!
//! Used by the progress reporter (and anything else that publishes a
//! file readers may poll) so that a reader never observes a
//! half-written file: the new content is written to a sibling temp
//! file, fsynced, then renamed into place. `rename` is atomic on the
//! same filesystem, so a concurrent reader sees either the old
//! contents or the new ones, never a partial write.

use crate::{Error, Result};
use std::io::Write;
use std::path::Path;

/// Atomically replace the contents of `path` with `contents`.
///
/// Creates parent directories if needed. The temp file is created in
/// the same directory as `path` to guarantee the rename is same-filesystem.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }

    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    tmp.persist(path)
        .map_err(|e| Error::Io(e.error))?;

    Ok(())
}

/// Serialize `value` as pretty JSON and atomically write it to `path`.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| Error::Internal(format!("JSON serialization failed: {e}")))?;
    write_atomic(path, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn write_atomic_creates_file_with_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        write_atomic(&path, b"hello").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn write_atomic_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
    }

    #[test]
    fn write_json_atomic_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        write_json_atomic(&path, &Sample { value: 7 }).unwrap();

        let read_back: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read_back["value"], 7);
    }
}
