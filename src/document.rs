use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document not found or unreadable: {path}: {source}")]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("document is not valid UTF-8: {path}")]
    Encoding { path: PathBuf },

    #[error("failed to write document {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The text being patched plus the untouched copy it was loaded from.
///
/// Exclusively owned by one engine run; `original` is never mutated.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    original: String,
    text: String,
}

impl Document {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| DocumentError::NotFound {
            path: path.to_path_buf(),
            source,
        })?;
        let original = String::from_utf8(bytes).map_err(|_| DocumentError::Encoding {
            path: path.to_path_buf(),
        })?;
        Ok(Self::from_text(path, original))
    }

    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let original = text.into();
        Self {
            path: path.into(),
            text: original.clone(),
            original,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn is_modified(&self) -> bool {
        self.text != self.original
    }

    pub(crate) fn text_mut(&mut self) -> &mut String {
        &mut self.text
    }

    /// Write the patched text back to the document path atomically.
    pub fn commit(&self) -> Result<(), DocumentError> {
        atomic_write(&self.path, self.text.as_bytes()).map_err(|source| DocumentError::Write {
            path: self.path.clone(),
            source,
        })?;

        // Bump mtime so Xcode notices the change
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&self.path, now).map_err(|source| DocumentError::Write {
            path: self.path.clone(),
            source,
        })?;

        tracing::info!(path = %self.path.display(), "document written");
        Ok(())
    }
}

/// Atomic file write: tempfile + fsync + rename.
///
/// Either the full write succeeds or the destination is left as it was.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;

    Ok(())
}
