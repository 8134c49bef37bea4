//! Top-level folder index.

use std::sync::Arc;

use futures_util::future::join_all;
use protocol::{DirStats, FolderSummary};
use tracing::{debug, warn};

use super::aggregate::DirectoryAggregator;
use super::error::FsError;
use super::resolver::RootBoundary;

/// Summarizes the folders directly under the root.
#[derive(Debug, Clone)]
pub struct FolderIndex {
    root: Arc<RootBoundary>,
    aggregator: DirectoryAggregator,
}

impl FolderIndex {
    /// Create an index over `root`.
    pub fn new(root: Arc<RootBoundary>, aggregator: DirectoryAggregator) -> Self {
        Self { root, aggregator }
    }

    /// List the root's subdirectories with their aggregates, sorted by name.
    ///
    /// Files directly under the root are not part of the index. Sibling
    /// folders are aggregated concurrently; the aggregator's handle limit
    /// bounds the total number of open directories.
    pub async fn list_folders(&self) -> Result<Vec<FolderSummary>, FsError> {
        let root = self.root.root();
        let mut entries = tokio::fs::read_dir(root.as_path())
            .await
            .map_err(FsError::from_io)?;

        let mut folders = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Root directory read interrupted");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.aggregator.counts_hidden() && name.starts_with('.') {
                continue;
            }
            match entry.file_type().await {
                Ok(t) if t.is_dir() => folders.push((name, root.join_entry(&entry.file_name()))),
                _ => {}
            }
        }

        let summaries = join_all(folders.into_iter().map(|(name, path)| async move {
            match self.aggregator.aggregate(&path).await {
                Ok(stats) => Some(FolderSummary::new(name, stats)),
                Err(FsError::NotFound) => None,
                Err(e) => {
                    warn!(folder = %name, error = ?e, "Folder unreadable, reporting empty stats");
                    Some(FolderSummary::new(name, DirStats::EMPTY))
                }
            }
        }))
        .await;

        let mut summaries: Vec<FolderSummary> = summaries.into_iter().flatten().collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));

        debug!(folders = summaries.len(), "Indexed top-level folders");
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn index(temp_dir: &TempDir) -> FolderIndex {
        let root = Arc::new(RootBoundary::new(temp_dir.path()).unwrap());
        FolderIndex::new(root, DirectoryAggregator::default())
    }

    #[tokio::test]
    async fn test_folders_scenario() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("docs/sub")).unwrap();
        fs::create_dir_all(temp_dir.path().join("pics")).unwrap();
        fs::write(temp_dir.path().join("docs/a.txt"), "0123456789").unwrap();
        fs::write(temp_dir.path().join("docs/sub/b.txt"), "01234").unwrap();

        let folders = index(&temp_dir).list_folders().await.unwrap();

        assert_eq!(
            folders,
            vec![
                FolderSummary::new("docs", DirStats::new(2, 15)),
                FolderSummary::new("pics", DirStats::EMPTY),
            ]
        );
    }

    #[tokio::test]
    async fn test_root_files_excluded() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("loose.txt"), "loose").unwrap();
        fs::create_dir_all(temp_dir.path().join("only")).unwrap();

        let folders = index(&temp_dir).list_folders().await.unwrap();
        assert_eq!(folders.len(), 1);
        assert_eq!(folders[0].name, "only");
    }

    #[tokio::test]
    async fn test_empty_root() {
        let temp_dir = TempDir::new().unwrap();
        let folders = index(&temp_dir).list_folders().await.unwrap();
        assert!(folders.is_empty());
    }

    #[tokio::test]
    async fn test_sorted_by_name() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["gamma", "alpha", "beta"] {
            fs::create_dir_all(temp_dir.path().join(name)).unwrap();
        }

        let folders = index(&temp_dir).list_folders().await.unwrap();
        let names: Vec<&str> = folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinked_folder_not_indexed() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("x"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linked")).unwrap();

        let folders = index(&temp_dir).list_folders().await.unwrap();
        assert!(folders.is_empty());
    }
}
