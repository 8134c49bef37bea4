//! Root boundary and untrusted path resolution.
//!
//! Client paths are resolved in two steps. The lexical step folds `.` and
//! `..` segments against the root without touching the file system, so a
//! request that climbs above the root is refused before any I/O happens.
//! The canonical step resolves symlinks and checks containment component by
//! component (`/data-evil` is not inside `/data`).

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use super::error::FsError;

/// The single directory the service is allowed to expose.
///
/// Holds the canonical form of the configured root. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootBoundary {
    root: PathBuf,
}

impl RootBoundary {
    /// Canonicalize `path` and use it as the root.
    ///
    /// Fails with [`FsError::NotFound`] if the directory does not exist and
    /// [`FsError::NotADirectory`] if it is not a directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, FsError> {
        let root = std::fs::canonicalize(path.as_ref()).map_err(FsError::from_io)?;
        if !root.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(Self { root })
    }

    /// The canonical root path.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The root itself as a resolved path.
    pub fn root(&self) -> ResolvedPath {
        ResolvedPath(self.root.clone())
    }

    /// Resolve a client-supplied relative path under the root.
    ///
    /// An empty path resolves to the root. `/` separates segments, and so
    /// does `\` on platforms where it is a path separator; elsewhere it is an
    /// ordinary filename character. Leading separators are ignored, so `/etc`
    /// means `<root>/etc`.
    pub async fn resolve(&self, relative: &str) -> Result<ResolvedPath, FsError> {
        let lexical = self.join_lexical(relative)?;
        let canonical = tokio::fs::canonicalize(&lexical)
            .await
            .map_err(FsError::from_io)?;
        self.contain(canonical)
    }

    /// Join `relative` onto the root, folding `.` and `..` segments.
    fn join_lexical(&self, relative: &str) -> Result<PathBuf, FsError> {
        if relative.contains('\0') {
            return Err(FsError::PathTraversal);
        }

        let mut segments: Vec<&str> = Vec::new();
        for segment in relative.split(is_segment_separator) {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(FsError::PathTraversal);
                    }
                }
                name => {
                    // Drive prefixes and similar platform forms are not names.
                    let mut components = Path::new(name).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(_)), None) => segments.push(name),
                        _ => return Err(FsError::PathTraversal),
                    }
                }
            }
        }

        let mut path = self.root.clone();
        path.extend(segments);
        Ok(path)
    }

    /// Accept a canonical path only if it lies at or below the root.
    fn contain(&self, canonical: PathBuf) -> Result<ResolvedPath, FsError> {
        if canonical.starts_with(&self.root) {
            Ok(ResolvedPath(canonical))
        } else {
            warn!(
                target = %canonical.display(),
                "Rejected path resolving outside the root"
            );
            Err(FsError::PathTraversal)
        }
    }
}

fn is_segment_separator(c: char) -> bool {
    c == '/' || (c == '\\' && std::path::is_separator(c))
}

/// An absolute, canonical path inside a [`RootBoundary`].
///
/// Only produced by [`RootBoundary::resolve`] or by joining a name read
/// from a directory that is itself a resolved path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Borrow the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Final path component, lossily converted.
    pub fn file_name(&self) -> Option<String> {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Whether this path is the root itself.
    pub fn is_root_of(&self, boundary: &RootBoundary) -> bool {
        self.0 == boundary.root
    }

    /// Whether any component below the boundary starts with '.'.
    ///
    /// The root's own components are not considered, so a root living in a
    /// dot-directory is not hidden from itself.
    pub fn is_hidden_below(&self, boundary: &RootBoundary) -> bool {
        let Ok(below) = self.0.strip_prefix(&boundary.root) else {
            return false;
        };
        below.components().any(|component| match component {
            Component::Normal(name) => name.to_string_lossy().starts_with('.'),
            _ => false,
        })
    }

    /// Join a name read from this directory's own listing.
    ///
    /// The name comes from the file system, not from a client, and the
    /// caller must not follow it if it is a symlink.
    pub(crate) fn join_entry(&self, name: &OsStr) -> ResolvedPath {
        ResolvedPath(self.0.join(name))
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}
