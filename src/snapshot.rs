//! Snapshot manager: byte-for-byte backups written before the document is touched.

use crate::document::atomic_write;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Suffix used when a plan does not name its own.
pub const DEFAULT_BACKUP_SUFFIX: &str = ".pbxpatch_backup";

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("document not found or unreadable: {path}: {source}")]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write backup {path}: {source}")]
    BackupWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot restore from {path}: {source}")]
    Restore {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("backup {path} changed since it was taken")]
    BackupModified { path: PathBuf },
}

/// Where a snapshot lives and what it contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    pub original: PathBuf,
    pub backup: PathBuf,
    /// xxh3 of the backed-up bytes, when the handle came from [`snapshot`].
    pub digest: Option<u64>,
}

impl BackupHandle {
    /// Handle for an existing backup on disk, e.g. one written by an earlier run.
    pub fn existing(original: impl AsRef<Path>, suffix: &str) -> Self {
        let original = original.as_ref();
        Self {
            original: original.to_path_buf(),
            backup: backup_path(original, suffix),
            digest: None,
        }
    }
}

/// `path` with `suffix` appended to its file name.
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Copy the document at `path` to its backup path. An existing backup is overwritten.
pub fn snapshot(path: impl AsRef<Path>, suffix: &str) -> Result<BackupHandle, SnapshotError> {
    let path = path.as_ref();
    let content = fs::read(path).map_err(|source| SnapshotError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;

    let backup = backup_path(path, suffix);
    atomic_write(&backup, &content).map_err(|source| SnapshotError::BackupWrite {
        path: backup.clone(),
        source,
    })?;

    tracing::info!(backup = %backup.display(), bytes = content.len(), "backup written");
    Ok(BackupHandle {
        original: path.to_path_buf(),
        backup,
        digest: Some(xxh3_64(&content)),
    })
}

/// Rewrite the original document from its backup, byte-for-byte.
pub fn restore(handle: &BackupHandle) -> Result<(), SnapshotError> {
    let content = fs::read(&handle.backup).map_err(|source| SnapshotError::Restore {
        path: handle.backup.clone(),
        source,
    })?;

    if let Some(digest) = handle.digest {
        if xxh3_64(&content) != digest {
            return Err(SnapshotError::BackupModified {
                path: handle.backup.clone(),
            });
        }
    }

    atomic_write(&handle.original, &content).map_err(|source| SnapshotError::Restore {
        path: handle.original.clone(),
        source,
    })?;

    tracing::info!(
        original = %handle.original.display(),
        backup = %handle.backup.display(),
        "document restored from backup"
    );
    Ok(())
}
