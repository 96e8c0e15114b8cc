//! Atomic replacement of the proxy config file.
//!
//! Content goes to `<path>.gymgate.tmp` first and is renamed over the target,
//! so nginx never reads a half-written file.

use std::path::{Path, PathBuf};

use crate::error::{write_err, SyncError};

pub const TMP_SUFFIX: &str = ".gymgate.tmp";

pub fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}{TMP_SUFFIX}", path.display()))
}

/// Write `content` to `path` via a temp sibling and rename.
///
/// On failure the temp file is removed and the existing target, if any, is
/// left byte-identical.
pub fn write_atomic(path: &Path, content: &str) -> Result<(), SyncError> {
    write_atomic_with_tmp(path, content, &tmp_path(path))
}

fn write_atomic_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<(), SyncError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }

    if let Err(e) = std::fs::write(tmp, content) {
        let _ = std::fs::remove_file(tmp);
        return Err(write_err(tmp, e));
    }

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(write_err(path, e));
    }

    tracing::debug!(path = %path.display(), bytes = content.len(), "wrote proxy config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn creates_parent_and_writes() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("etc/nginx/nginx.conf");
        write_atomic(&target, "events {}\n").expect("write");
        assert_eq!(fs::read_to_string(&target).unwrap(), "events {}\n");
        assert!(!tmp_path(&target).exists());
    }

    #[test]
    fn replaces_existing_content() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("nginx.conf");
        fs::write(&target, "old").unwrap();
        write_atomic(&target, "new").expect("write");
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn failed_rename_keeps_target_and_cleans_tmp() {
        let dir = TempDir::new().expect("tempdir");
        // A non-empty directory cannot be replaced by a file.
        let target = dir.path().join("nginx.conf");
        fs::create_dir_all(target.join("occupied")).unwrap();

        let err = write_atomic(&target, "new").unwrap_err();
        assert!(matches!(err, SyncError::ConfigWrite { .. }), "got: {err}");
        assert!(target.join("occupied").is_dir());
        assert!(!tmp_path(&target).exists());
    }

    #[test]
    fn unwritable_tmp_location_is_a_write_error() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("nginx.conf");
        fs::write(&target, "keep me").unwrap();
        let tmp = dir.path().join("missing-dir/nginx.conf.tmp");

        let err = write_atomic_with_tmp(&target, "new", &tmp).unwrap_err();
        assert!(matches!(err, SyncError::ConfigWrite { .. }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep me");
    }
}
