//! Recursive directory aggregation.
//!
//! A walk keeps an explicit queue of directories still to scan and drains it
//! with a bounded set of worker tasks. Each worker scans one directory: it
//! counts the regular files it holds and hands its subdirectories back to
//! the queue. Open directory handles are capped process-wide by a semaphore
//! shared by every clone of the aggregator, so concurrent requests cannot
//! exhaust file descriptors between them.
//!
//! # Failure policy
//!
//! Only the starting directory must be readable. Below it the walk is best
//! effort: an entry or subdirectory that vanishes or cannot be read while
//! the walk runs contributes zero and is logged at `warn`.
//!
//! Symlinks are never followed and, like sockets, fifos and devices,
//! contribute zero.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use protocol::DirStats;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::error::FsError;
use super::resolver::ResolvedPath;

/// Default cap on concurrently scanned directories.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Computes [`DirStats`] for directory subtrees.
///
/// Cheap to clone; clones share the handle limit.
#[derive(Debug, Clone)]
pub struct DirectoryAggregator {
    /// Permits for open directory handles, shared across clones.
    permits: Arc<Semaphore>,
    /// Worker tasks per walk.
    workers: usize,
    /// Whether dot-entries are counted.
    include_hidden: bool,
}

/// Result of scanning one directory.
#[derive(Debug, Default)]
struct DirScan {
    files: DirStats,
    subdirs: Vec<PathBuf>,
}

impl DirectoryAggregator {
    /// Create an aggregator allowing `max_concurrency` open directories.
    pub fn new(max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            workers: max_concurrency,
            include_hidden: true,
        }
    }

    /// Set whether entries whose name starts with '.' are counted.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Whether dot-entries are counted.
    pub fn counts_hidden(&self) -> bool {
        self.include_hidden
    }

    /// Aggregate the subtree rooted at `dir`.
    ///
    /// Fails with [`FsError::NotFound`] or [`FsError::NotReadable`] only if
    /// `dir` itself cannot be listed. Dropping the returned future aborts
    /// every worker of this walk.
    pub async fn aggregate(&self, dir: &ResolvedPath) -> Result<DirStats, FsError> {
        let first = self.scan(dir.as_path().to_path_buf()).await?;
        let mut stats = first.files;
        let mut pending = first.subdirs;
        let mut workers = JoinSet::new();

        loop {
            while workers.len() < self.workers {
                let Some(next) = pending.pop() else { break };
                let this = self.clone();
                workers.spawn(async move {
                    let result = this.scan(next.clone()).await;
                    (next, result)
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };

            match joined {
                Ok((_, Ok(scan))) => {
                    stats += scan.files;
                    pending.extend(scan.subdirs);
                }
                Ok((path, Err(e))) => {
                    warn!(
                        path = %path.display(),
                        error = ?e,
                        "Skipping unreadable directory during aggregation"
                    );
                }
                Err(e) => {
                    warn!("Aggregation worker failed: {}", e);
                }
            }
        }

        debug!(
            path = %dir,
            total_files = stats.total_files,
            total_size = stats.total_size,
            "Aggregated directory"
        );
        Ok(stats)
    }

    /// Scan one directory: count its files, collect its subdirectories.
    async fn scan(&self, dir: PathBuf) -> Result<DirScan, FsError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FsError::NotReadable(io::Error::other("aggregation pool closed")))?;

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(FsError::from_io)?;
        let mut scan = DirScan::default();

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Directory read interrupted");
                    break;
                }
            };

            if !self.include_hidden && entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }

            // Does not follow symlinks.
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "Entry vanished");
                    continue;
                }
            };

            if file_type.is_dir() {
                scan.subdirs.push(entry.path());
            } else if file_type.is_file() {
                match entry.metadata().await {
                    Ok(metadata) => scan.files.add_file(metadata.len()),
                    Err(e) => {
                        debug!(path = %entry.path().display(), error = %e, "Entry vanished");
                    }
                }
            } else {
                debug!(path = %entry.path().display(), "Skipping symlink or special file");
            }
        }

        Ok(scan)
    }
}

impl Default for DirectoryAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::resolver::RootBoundary;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::Instant;

    fn create_test_structure(dir: &Path) {
        fs::create_dir_all(dir.join("docs/sub")).unwrap();
        fs::create_dir_all(dir.join("pics")).unwrap();
        fs::write(dir.join("docs/a.txt"), "0123456789").unwrap();
        fs::write(dir.join("docs/sub/b.txt"), "01234").unwrap();
    }

    /// `width` folders, each holding `depth` nested folders with a one-byte
    /// file at every level.
    fn create_wide_tree(dir: &Path, width: usize, depth: usize) {
        for i in 0..width {
            let mut level = dir.join(format!("w{i}"));
            for _ in 0..depth {
                fs::create_dir_all(&level).unwrap();
                fs::write(level.join("f"), "x").unwrap();
                level = level.join("n");
            }
        }
    }

    fn boundary(temp_dir: &TempDir) -> RootBoundary {
        RootBoundary::new(temp_dir.path()).unwrap()
    }

    /// Stats of `dir` computed from its direct children, recursing through
    /// the aggregator for subdirectories.
    async fn children_sum(
        aggregator: &DirectoryAggregator,
        boundary: &RootBoundary,
        relative: &str,
    ) -> DirStats {
        let dir = boundary.resolve(relative).await.unwrap();
        let mut stats = DirStats::default();
        for entry in fs::read_dir(dir.as_path()).unwrap() {
            let entry = entry.unwrap();
            let file_type = entry.file_type().unwrap();
            if file_type.is_file() {
                stats.add_file(entry.metadata().unwrap().len());
            } else if file_type.is_dir() {
                let child = dir.join_entry(&entry.file_name());
                stats += aggregator.aggregate(&child).await.unwrap();
            }
        }
        stats
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let boundary = boundary(&temp_dir);

        let stats = DirectoryAggregator::default()
            .aggregate(&boundary.root())
            .await
            .unwrap();
        assert_eq!(stats, DirStats::EMPTY);
    }

    #[tokio::test]
    async fn test_recursive_totals() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let boundary = boundary(&temp_dir);
        let aggregator = DirectoryAggregator::default();

        let docs = boundary.resolve("docs").await.unwrap();
        assert_eq!(
            aggregator.aggregate(&docs).await.unwrap(),
            DirStats::new(2, 15)
        );

        let pics = boundary.resolve("pics").await.unwrap();
        assert_eq!(aggregator.aggregate(&pics).await.unwrap(), DirStats::EMPTY);
    }

    #[tokio::test]
    async fn test_folder_equals_sum_of_children() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        fs::create_dir_all(temp_dir.path().join("docs/sub/deeper/deepest")).unwrap();
        fs::write(temp_dir.path().join("docs/sub/deeper/c.bin"), vec![0u8; 300]).unwrap();
        fs::write(
            temp_dir.path().join("docs/sub/deeper/deepest/d.bin"),
            vec![0u8; 7],
        )
        .unwrap();
        fs::write(temp_dir.path().join("top.txt"), "top").unwrap();

        let boundary = boundary(&temp_dir);
        let aggregator = DirectoryAggregator::new(2);

        for relative in ["", "docs", "docs/sub", "docs/sub/deeper", "pics"] {
            let dir = boundary.resolve(relative).await.unwrap();
            let whole = aggregator.aggregate(&dir).await.unwrap();
            let parts = children_sum(&aggregator, &boundary, relative).await;
            assert_eq!(whole, parts, "aggregate law broken for {relative:?}");
        }

        let root = aggregator.aggregate(&boundary.root()).await.unwrap();
        assert_eq!(root, DirStats::new(5, 10 + 5 + 300 + 7 + 3));
    }

    #[tokio::test]
    async fn test_single_worker_matches_many_workers() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..20 {
            let dir = temp_dir.path().join(format!("d{i}/inner"));
            fs::create_dir_all(&dir).unwrap();
            fs::write(dir.join("f.txt"), vec![1u8; i + 1]).unwrap();
        }
        let boundary = boundary(&temp_dir);

        let narrow = DirectoryAggregator::new(1)
            .aggregate(&boundary.root())
            .await
            .unwrap();
        let wide = DirectoryAggregator::new(64)
            .aggregate(&boundary.root())
            .await
            .unwrap();

        assert_eq!(narrow, wide);
        assert_eq!(narrow, DirStats::new(20, (1..=20).sum()));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_clamped() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let boundary = boundary(&temp_dir);

        let stats = DirectoryAggregator::new(0)
            .aggregate(&boundary.root())
            .await
            .unwrap();
        assert_eq!(stats, DirStats::new(2, 15));
    }

    #[tokio::test]
    async fn test_hidden_entries_policy() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join(".cache")).unwrap();
        fs::write(temp_dir.path().join(".cache/blob"), "12345678").unwrap();
        fs::write(temp_dir.path().join(".hidden"), "12").unwrap();
        fs::write(temp_dir.path().join("shown"), "1").unwrap();
        let boundary = boundary(&temp_dir);

        let all = DirectoryAggregator::default();
        assert!(all.counts_hidden());
        assert_eq!(
            all.aggregate(&boundary.root()).await.unwrap(),
            DirStats::new(3, 11)
        );

        let visible = DirectoryAggregator::default().include_hidden(false);
        assert_eq!(
            visible.aggregate(&boundary.root()).await.unwrap(),
            DirStats::new(1, 1)
        );
    }

    #[tokio::test]
    async fn test_vanished_directory_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let boundary = boundary(&temp_dir);
        let docs = boundary.resolve("docs").await.unwrap();
        fs::remove_dir_all(temp_dir.path().join("docs")).unwrap();

        let result = DirectoryAggregator::default().aggregate(&docs).await;
        assert!(matches!(result, Err(FsError::NotFound)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_contribute_zero() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("big.bin"), vec![0u8; 4096]).unwrap();

        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("docs/outside")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("docs/a.txt"),
            temp_dir.path().join("docs/a-link.txt"),
        )
        .unwrap();
        // A loop must not hang the walk.
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("docs/sub/loop"))
            .unwrap();

        let boundary = boundary(&temp_dir);
        let docs = boundary.resolve("docs").await.unwrap();
        let stats = DirectoryAggregator::default().aggregate(&docs).await.unwrap();
        assert_eq!(stats, DirStats::new(2, 15));
    }

    #[tokio::test]
    async fn test_walk_waits_while_every_handle_is_taken() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let boundary = boundary(&temp_dir);
        let root = boundary.root();

        let aggregator = DirectoryAggregator::new(2);
        let clone = aggregator.clone();
        let held = Arc::clone(&aggregator.permits)
            .acquire_many_owned(2)
            .await
            .unwrap();

        // Permits taken through one clone block walks on every other clone.
        let blocked = tokio::time::timeout(Duration::from_millis(100), clone.aggregate(&root)).await;
        assert!(blocked.is_err(), "walk finished without a free handle");

        drop(held);
        let stats = tokio::time::timeout(Duration::from_secs(10), clone.aggregate(&root))
            .await
            .expect("walk still blocked after handles were released")
            .unwrap();
        assert_eq!(stats, DirStats::new(2, 15));
        assert_eq!(aggregator.permits.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_walk_progresses_with_one_free_handle() {
        let temp_dir = TempDir::new().unwrap();
        create_wide_tree(temp_dir.path(), 8, 4);
        let boundary = boundary(&temp_dir);

        let aggregator = DirectoryAggregator::new(4);
        let held = Arc::clone(&aggregator.permits)
            .acquire_many_owned(3)
            .await
            .unwrap();

        let stats = tokio::time::timeout(
            Duration::from_secs(10),
            aggregator.aggregate(&boundary.root()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(stats, DirStats::new(32, 32));

        // Permits held elsewhere are untouched by the walk.
        assert_eq!(aggregator.permits.available_permits(), 1);
        drop(held);
        assert_eq!(aggregator.permits.available_permits(), 4);
    }

    #[tokio::test]
    async fn test_dropping_walk_releases_handles_and_workers() {
        let temp_dir = TempDir::new().unwrap();
        create_wide_tree(temp_dir.path(), 40, 15);
        let boundary = boundary(&temp_dir);
        let root = boundary.root();

        let aggregator = DirectoryAggregator::new(2);
        let cut_short =
            tokio::time::timeout(Duration::from_millis(1), aggregator.aggregate(&root)).await;
        assert!(cut_short.is_err(), "walk finished before it could be dropped");

        // Workers hold a clone each; once aborted only ours is left.
        let deadline = Instant::now() + Duration::from_secs(5);
        while (aggregator.permits.available_permits() < 2
            || Arc::strong_count(&aggregator.permits) > 1)
            && Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(aggregator.permits.available_permits(), 2);
        assert_eq!(Arc::strong_count(&aggregator.permits), 1);

        // The aggregator is still usable afterwards.
        let stats = aggregator.aggregate(&root).await.unwrap();
        assert_eq!(stats, DirStats::new(600, 600));
    }
}
