//! Atomic file output.
//!
//! Files are written to a temporary sibling, flushed to disk and renamed into
//! place. A failure at any step leaves the destination untouched and removes
//! the temporary file.

use medgate_license::{LicenseError, LicenseResult};
use std::io::Write;
use std::path::Path;

/// Who may read the written file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Owner read/write only (`0600` on unix).
    Private,
    /// World-readable (`0644` on unix).
    Public,
}

/// Writes `contents` to `path` atomically.
///
/// With `overwrite` false an existing destination is an error.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    visibility: Visibility,
    overwrite: bool,
) -> LicenseResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let storage = |what: &str, e: std::io::Error| {
        LicenseError::Storage(format!("{what} {}: {e}", path.display()))
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".medgate-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| storage("failed to create temporary file for", e))?;

    tmp.write_all(contents)
        .map_err(|e| storage("failed to write", e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| storage("failed to sync", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = match visibility {
            Visibility::Private => 0o600,
            Visibility::Public => 0o644,
        };
        std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(mode))
            .map_err(|e| storage("failed to set permissions on", e))?;
    }
    #[cfg(not(unix))]
    let _ = visibility;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map_err(|e| storage("failed to move into place", e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn replaces_existing_file_when_allowed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("license.mgl");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new", Visibility::Public, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn no_clobber_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("key.pem");
        std::fs::write(&path, "original").unwrap();

        let err = write_atomic(&path, b"replacement", Visibility::Private, false).unwrap_err();
        assert!(matches!(err, LicenseError::Storage(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn missing_directory_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent").join("license.mgl");
        assert!(matches!(
            write_atomic(&path, b"x", Visibility::Public, true),
            Err(LicenseError::Storage(_))
        ));
    }
}
