//! Source file access for builds.
//!
//! Builds never touch the filesystem directly; they read through a
//! [`SourceFs`]. [`OsFs`] reads from disk below a root directory and
//! [`MemoryFs`] serves sources held in memory.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Errors raised while reading a source file.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// No file exists at the path.
    #[error("no source file at {path}")]
    NotFound {
        /// Requested path.
        path: Utf8PathBuf,
    },

    /// The file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Requested path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The file is not valid UTF-8.
    #[error("{path} is not valid UTF-8")]
    InvalidUtf8 {
        /// Requested path.
        path: Utf8PathBuf,
    },
}

/// Read access to build sources.
///
/// Paths are relative to the source root and already normalised with
/// [`normalise`].
pub trait SourceFs: Send + Sync {
    /// Reads a source file as text.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when no file exists at `path`, or
    /// another [`SourceError`] when it cannot be read.
    fn read(&self, path: &Utf8Path) -> Result<String, SourceError>;

    /// Returns `true` when a file exists at `path`.
    fn exists(&self, path: &Utf8Path) -> bool;
}

/// Reads sources from disk below a root directory.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: Utf8PathBuf,
}

impl OsFs {
    /// Creates a filesystem rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory every source path is resolved against.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

impl Default for OsFs {
    fn default() -> Self {
        Self::new(".")
    }
}

impl SourceFs for OsFs {
    fn read(&self, path: &Utf8Path) -> Result<String, SourceError> {
        let full = self.root.join(path);
        let bytes = std::fs::read(&full).map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                SourceError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                SourceError::Io {
                    path: path.to_path_buf(),
                    source: Arc::new(error),
                }
            }
        })?;
        String::from_utf8(bytes).map_err(|_| SourceError::InvalidUtf8 {
            path: path.to_path_buf(),
        })
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.root.join(path).is_file()
    }
}

/// Sources held in memory, keyed by normalised path.
#[derive(Debug, Clone, Default)]
pub struct MemoryFs {
    files: HashMap<Utf8PathBuf, String>,
}

impl MemoryFs {
    /// Creates an empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Utf8Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Adds or replaces a file in place.
    pub fn insert(&mut self, path: impl AsRef<Utf8Path>, contents: impl Into<String>) {
        self.files.insert(normalise(path.as_ref()), contents.into());
    }
}

impl SourceFs for MemoryFs {
    fn read(&self, path: &Utf8Path) -> Result<String, SourceError> {
        self.files
            .get(&normalise(path))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                path: path.to_path_buf(),
            })
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.files.contains_key(&normalise(path))
    }
}

/// Lexically removes `.` components and folds `..` into its parent.
///
/// A leading `..` that cannot be folded is kept.
#[must_use]
pub fn normalise(path: &Utf8Path) -> Utf8PathBuf {
    let mut parts: Vec<Utf8Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => match parts.last() {
                Some(Utf8Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Utf8Component::RootDir | Utf8Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().map(Utf8Component::as_str).collect()
}
