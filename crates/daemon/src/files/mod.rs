//! File services for the shared root.
//!
//! This module provides the sandboxed read-only file operations:
//! - Path resolution against a single root boundary
//! - Recursive folder aggregation (file count and byte total)
//! - Folder listings decorated with aggregates
//! - Top-level folder index
//! - Streamed file downloads
//!
//! # Security
//!
//! Every client path goes through [`RootBoundary::resolve`]. Paths that climb
//! above the root are refused before any file system access, and paths that
//! canonicalize outside the root (through symlinks) are refused after.
//! Errors never carry server paths.

pub mod aggregate;
pub mod browser;
pub mod error;
pub mod index;
pub mod resolver;
pub mod transfer;

pub use aggregate::{DirectoryAggregator, DEFAULT_MAX_CONCURRENCY};
pub use browser::DirectoryBrowser;
pub use error::FsError;
pub use index::FolderIndex;
pub use resolver::{ResolvedPath, RootBoundary};
pub use transfer::{ByteRange, FileDownload, FileTransfer, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
