use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, SnapshotError};
use crate::DEFAULT_INTERVAL_SECS;

/// Capture interval from the command line.
///
/// Missing, non-positive or non-numeric values fall back to the default.
pub fn resolve_interval(raw: Option<&str>) -> Duration {
    let secs = match raw.map(|s| s.trim().parse::<i64>()) {
        None => DEFAULT_INTERVAL_SECS,
        Some(Ok(secs)) if secs > 0 => secs as u64,
        Some(_) => {
            warn!(
                "Invalid interval {:?}, using {}s",
                raw.unwrap_or_default(),
                DEFAULT_INTERVAL_SECS
            );
            DEFAULT_INTERVAL_SECS
        }
    };
    Duration::from_secs(secs)
}

/// Create the snapshot directory (mode 0755) unless it already exists
pub fn ensure_snapshot_dir(path: &Path) -> Result<()> {
    let dir_err = |source| SnapshotError::Directory {
        path: path.to_path_buf(),
        source,
    };

    match DirBuilder::new().mode(0o755).create(path) {
        Ok(()) => {
            info!("Created snapshot directory {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if path.is_dir() {
                Ok(())
            } else {
                Err(dir_err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "path exists and is not a directory",
                )))
            }
        }
        Err(e) => Err(dir_err(e)),
    }
}

/// Create the snapshot directory and return its absolute path.
///
/// Detaching moves the working directory to `/`, so a relative path has to
/// be pinned down first.
pub fn prepare_snapshot_dir(path: &Path) -> Result<PathBuf> {
    ensure_snapshot_dir(path)?;
    let absolute = path
        .canonicalize()
        .map_err(|source| SnapshotError::Directory {
            path: path.to_path_buf(),
            source,
        })?;
    if absolute != path {
        debug!("Snapshot directory resolved to {}", absolute.display());
    }
    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn interval_defaults() {
        let default = Duration::from_secs(30);
        assert_eq!(resolve_interval(None), default);
        assert_eq!(resolve_interval(Some("0")), default);
        assert_eq!(resolve_interval(Some("-5")), default);
        assert_eq!(resolve_interval(Some("soon")), default);
        assert_eq!(resolve_interval(Some("")), default);
    }

    #[test]
    fn interval_accepts_positive_seconds() {
        assert_eq!(resolve_interval(Some("5")), Duration::from_secs(5));
        assert_eq!(resolve_interval(Some(" 120 ")), Duration::from_secs(120));
        assert_eq!(
            resolve_interval(Some("9223372036854775807")),
            Duration::from_secs(i64::MAX as u64)
        );
    }

    #[test]
    fn directory_creation_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("snapshots");

        ensure_snapshot_dir(&dir).unwrap();
        ensure_snapshot_dir(&dir).unwrap();

        assert!(dir.is_dir());
        let mode = std::fs::metadata(&dir).unwrap().permissions().mode();
        // umask may only remove bits
        assert_eq!(mode & !0o755 & 0o777, 0);
    }

    #[test]
    fn file_in_the_way_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("snapshots");
        std::fs::write(&file, b"").unwrap();

        let err = ensure_snapshot_dir(&file).unwrap_err();
        assert!(matches!(err, SnapshotError::Directory { .. }));
    }

    #[test]
    fn prepared_directory_is_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("snapshots").join("..").join("snapshots");
        std::fs::create_dir(tmp.path().join("snapshots")).unwrap();

        let prepared = prepare_snapshot_dir(&dir).unwrap();
        assert!(prepared.is_absolute());
        assert_eq!(prepared, tmp.path().canonicalize().unwrap().join("snapshots"));
    }

    #[test]
    fn missing_parent_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("a").join("b");
        assert!(ensure_snapshot_dir(&dir).is_err());
    }
}
