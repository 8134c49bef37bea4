//! Folder listing with aggregate decoration.
//!
//! Lists the immediate children of a folder under the root. Files carry
//! their size and modification time; folders additionally carry the
//! [`DirStats`] of their whole subtree.
//!
//! Every folder in a listing is aggregated afresh, so listing a folder costs
//! the sum of its subtrees. Nothing is cached.

use std::fs::Metadata;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use protocol::{DirStats, EntryDescriptor};
use tracing::{debug, warn};

use super::aggregate::DirectoryAggregator;
use super::error::FsError;
use super::resolver::{ResolvedPath, RootBoundary};

/// Lists folder contents below a [`RootBoundary`].
#[derive(Debug, Clone)]
pub struct DirectoryBrowser {
    root: Arc<RootBoundary>,
    aggregator: DirectoryAggregator,
}

/// A subdirectory waiting for its aggregate.
struct PendingFolder {
    name: String,
    path: ResolvedPath,
    modified: DateTime<Utc>,
}

impl DirectoryBrowser {
    /// Create a browser over `root`.
    pub fn new(root: Arc<RootBoundary>, aggregator: DirectoryAggregator) -> Self {
        Self { root, aggregator }
    }

    /// The boundary this browser is confined to.
    pub fn root(&self) -> &RootBoundary {
        &self.root
    }

    /// List the folder at `relative`.
    ///
    /// Folders come first, then files, each group sorted by name ignoring
    /// case. Symlinks and special files are omitted. When hidden entries are
    /// excluded, a folder inside a dot-directory is [`FsError::NotFound`].
    pub async fn list_directory(&self, relative: &str) -> Result<Vec<EntryDescriptor>, FsError> {
        let dir = self.root.resolve(relative).await?;
        if !self.aggregator.counts_hidden() && dir.is_hidden_below(&self.root) {
            debug!(path = %dir, "Refusing to list hidden folder");
            return Err(FsError::NotFound);
        }

        let metadata = tokio::fs::metadata(dir.as_path())
            .await
            .map_err(FsError::from_io)?;
        if !metadata.is_dir() {
            return Err(FsError::NotADirectory);
        }

        let mut entries = tokio::fs::read_dir(dir.as_path())
            .await
            .map_err(FsError::from_io)?;

        let mut files = Vec::new();
        let mut folders = Vec::new();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir, error = %e, "Directory read interrupted");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.aggregator.counts_hidden() && name.starts_with('.') {
                continue;
            }

            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue, // Vanished
            };
            if !file_type.is_dir() && !file_type.is_file() {
                debug!(name = %name, "Omitting symlink or special file from listing");
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue, // Vanished
            };

            if file_type.is_dir() {
                folders.push(PendingFolder {
                    path: dir.join_entry(&entry.file_name()),
                    name,
                    modified: modified_time(&metadata),
                });
            } else {
                files.push(EntryDescriptor::file(
                    name,
                    metadata.len(),
                    modified_time(&metadata),
                ));
            }
        }

        let aggregated = join_all(folders.into_iter().map(|folder| self.describe_folder(folder))).await;
        let mut results: Vec<EntryDescriptor> = aggregated.into_iter().flatten().collect();

        sort_entries(&mut files);
        sort_entries(&mut results);
        results.extend(files);

        debug!(path = %dir, entries = results.len(), "Listed directory");
        Ok(results)
    }

    /// Aggregate one listed folder. Folders deleted meanwhile are dropped.
    async fn describe_folder(&self, folder: PendingFolder) -> Option<EntryDescriptor> {
        let stats = match self.aggregator.aggregate(&folder.path).await {
            Ok(stats) => stats,
            Err(FsError::NotFound) => return None,
            Err(e) => {
                warn!(path = %folder.path, error = ?e, "Folder unreadable, reporting empty stats");
                DirStats::EMPTY
            }
        };
        Some(EntryDescriptor::folder(folder.name, stats, folder.modified))
    }
}

/// Modification time of an entry, or the epoch where unsupported.
pub(crate) fn modified_time(metadata: &Metadata) -> DateTime<Utc> {
    DateTime::<Utc>::from(metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH))
}

fn sort_entries(entries: &mut [EntryDescriptor]) {
    entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
}
