//! Data directory backups.
//!
//! A backup is a plain copy of `{home}/data` into
//! `~/.supervysor/backups/{height}/data`, where `height` is the node height at
//! the time of the copy. The node should be stopped while it runs; the copy
//! does not coordinate with a live database.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Errors from validating or copying a backup.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("source {0} does not exist")]
    SourceMissing(PathBuf),

    #[error("source {0} is not a directory")]
    SourceNotDir(PathBuf),

    #[error("backup {0} already exists")]
    DestinationExists(PathBuf),

    #[error("backup {dest} would be written inside its source {src}")]
    DestinationInsideSource { src: PathBuf, dest: PathBuf },

    #[error("could not walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("could not copy to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BackupError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            BackupError::SourceMissing(_) => "backup_source_missing",
            BackupError::SourceNotDir(_) => "backup_source_not_dir",
            BackupError::DestinationExists(_) => "backup_destination_exists",
            BackupError::DestinationInsideSource { .. } => "backup_destination_inside_source",
            BackupError::Walk { .. } | BackupError::Io { .. } => "backup_io_failed",
        }
    }
}

/// Outcome of a finished backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub dest: PathBuf,
    pub files: u64,
    pub bytes: u64,
}

/// `{backups_dir}/{height}/data`.
pub fn backup_dest(backups_dir: &Path, height: i64) -> PathBuf {
    backups_dir.join(height.to_string()).join("data")
}

/// Check that `src` is a directory and that `dest` is fresh and outside it.
pub fn validate_paths(src: &Path, dest: &Path) -> Result<(), BackupError> {
    let metadata = fs::metadata(src).map_err(|_| BackupError::SourceMissing(src.to_path_buf()))?;
    if !metadata.is_dir() {
        return Err(BackupError::SourceNotDir(src.to_path_buf()));
    }
    if dest.exists() {
        return Err(BackupError::DestinationExists(dest.to_path_buf()));
    }

    let src_abs = fs::canonicalize(src).map_err(|source| BackupError::Io {
        path: src.to_path_buf(),
        source,
    })?;
    if absolute_dest(dest)?.starts_with(&src_abs) {
        return Err(BackupError::DestinationInsideSource {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
        });
    }
    Ok(())
}

/// Resolve `dest` through its nearest existing ancestor, since `dest` itself
/// does not exist yet.
fn absolute_dest(dest: &Path) -> Result<PathBuf, BackupError> {
    let mut existing = dest;
    let mut rest = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let base = if existing.as_os_str().is_empty() {
        std::env::current_dir()
    } else {
        fs::canonicalize(existing)
    }
    .map_err(|source| BackupError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    Ok(rest.iter().rev().fold(base, |path, name| path.join(name)))
}

/// Copy `src` to `{backups_dir}/{height}/data`.
pub fn create_backup(
    src: &Path,
    backups_dir: &Path,
    height: i64,
) -> Result<BackupReport, BackupError> {
    let dest = backup_dest(backups_dir, height);
    validate_paths(src, &dest)?;

    info!(src = %src.display(), dest = %dest.display(), height, "Backing up node data");
    let (files, bytes) = copy_tree(src, &dest)?;
    info!(dest = %dest.display(), files, bytes, "Backup finished");

    Ok(BackupReport { dest, files, bytes })
}

fn copy_tree(src: &Path, dest: &Path) -> Result<(u64, u64), BackupError> {
    let mut files = 0u64;
    let mut bytes = 0u64;

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|source| BackupError::Walk {
            path: src.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);
        let io_err = |source| BackupError::Io {
            path: target.clone(),
            source,
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(io_err)?;
        } else if file_type.is_file() {
            bytes += fs::copy(entry.path(), &target).map_err(io_err)?;
            files += 1;
        } else {
            debug!(path = %entry.path().display(), "Skipping non-regular file");
        }
    }

    Ok((files, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_data(root: &Path) -> PathBuf {
        let data = root.join("node").join("data");
        fs::create_dir_all(data.join("application.db")).unwrap();
        fs::write(data.join("priv_validator_state.json"), "{}").unwrap();
        fs::write(data.join("application.db").join("000001.log"), vec![0u8; 100]).unwrap();
        data
    }

    #[test]
    fn test_backup_dest_layout() {
        assert_eq!(
            backup_dest(Path::new("/root/.supervysor/backups"), 1_234_567),
            PathBuf::from("/root/.supervysor/backups/1234567/data")
        );
    }

    #[test]
    fn test_create_backup_copies_tree() {
        let dir = tempfile::tempdir().unwrap();
        let src = node_data(dir.path());
        let backups = dir.path().join("backups");

        let report = create_backup(&src, &backups, 42).unwrap();
        assert_eq!(report.dest, backups.join("42").join("data"));
        assert_eq!(report.files, 2);
        assert_eq!(report.bytes, 102);
        assert_eq!(
            fs::read(report.dest.join("application.db").join("000001.log"))
                .unwrap()
                .len(),
            100
        );
        assert_eq!(
            fs::read_to_string(report.dest.join("priv_validator_state.json")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_backup_at_same_height_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = node_data(dir.path());
        let backups = dir.path().join("backups");

        create_backup(&src, &backups, 42).unwrap();
        let err = create_backup(&src, &backups, 42).unwrap_err();
        assert_eq!(err.reason_code(), "backup_destination_exists");
    }

    #[test]
    fn test_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = create_backup(&dir.path().join("absent"), dir.path(), 1).unwrap_err();
        assert!(matches!(err, BackupError::SourceMissing(_)));
    }

    #[test]
    fn test_source_must_be_dir() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data");
        fs::write(&file, "x").unwrap();
        let err = validate_paths(&file, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, BackupError::SourceNotDir(_)));
    }

    #[test]
    fn test_destination_inside_source_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let src = node_data(dir.path());

        let err = create_backup(&src, &src.join("backups"), 42).unwrap_err();
        assert!(matches!(err, BackupError::DestinationInsideSource { .. }));
        assert!(!src.join("backups").exists());
    }
}
