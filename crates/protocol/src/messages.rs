//! Wire types for the IgorFS HTTP API.
//!
//! Every type here serializes to the JSON shapes the dashboard consumes:
//! camelCase field names, ISO-8601 timestamps, lowercase entry kinds.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Aggregates
// ============================================================================

/// Recursive file count and byte total for a directory subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirStats {
    /// Number of regular files below the directory.
    pub total_files: u64,
    /// Sum of the byte lengths of those files.
    pub total_size: u64,
}

impl DirStats {
    /// Stats for a subtree holding nothing.
    pub const EMPTY: DirStats = DirStats {
        total_files: 0,
        total_size: 0,
    };

    /// Create stats from explicit totals.
    pub fn new(total_files: u64, total_size: u64) -> Self {
        Self {
            total_files,
            total_size,
        }
    }

    /// Count one regular file of `size` bytes.
    pub fn add_file(&mut self, size: u64) {
        self.total_files += 1;
        self.total_size = self.total_size.saturating_add(size);
    }

    /// Whether no files were counted.
    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }
}

impl Add for DirStats {
    type Output = DirStats;

    fn add(self, rhs: DirStats) -> DirStats {
        DirStats {
            total_files: self.total_files + rhs.total_files,
            total_size: self.total_size.saturating_add(rhs.total_size),
        }
    }
}

impl AddAssign for DirStats {
    fn add_assign(&mut self, rhs: DirStats) {
        *self = *self + rhs;
    }
}

impl Sum for DirStats {
    fn sum<I: Iterator<Item = DirStats>>(iter: I) -> DirStats {
        iter.fold(DirStats::EMPTY, Add::add)
    }
}

// ============================================================================
// Folder index
// ============================================================================

/// A top-level folder under the shared root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    /// Folder name (not a path).
    pub name: String,
    /// Number of regular files in the folder's subtree.
    pub total_files: u64,
    /// Byte total of the folder's subtree.
    pub total_size: u64,
}

impl FolderSummary {
    /// Pair a folder name with its aggregate.
    pub fn new(name: impl Into<String>, stats: DirStats) -> Self {
        Self {
            name: name.into(),
            total_files: stats.total_files,
            total_size: stats.total_size,
        }
    }

    /// The aggregate part of the summary.
    pub fn stats(&self) -> DirStats {
        DirStats::new(self.total_files, self.total_size)
    }
}

// ============================================================================
// Folder listing
// ============================================================================

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Folder,
}

/// One item of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDescriptor {
    /// Entry name (not a path).
    pub name: String,
    /// File or folder.
    pub kind: EntryKind,
    /// File length, or the subtree byte total for folders.
    pub size: u64,
    /// Last modification time of the entry itself.
    pub last_modified: DateTime<Utc>,
    /// Subtree file count, present for folders only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_files: Option<u64>,
    /// Subtree byte total, present for folders only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
}

impl EntryDescriptor {
    /// Describe a regular file.
    pub fn file(name: impl Into<String>, size: u64, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size,
            last_modified,
            total_files: None,
            total_size: None,
        }
    }

    /// Describe a folder decorated with its aggregate.
    pub fn folder(name: impl Into<String>, stats: DirStats, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Folder,
            size: stats.total_size,
            last_modified,
            total_files: Some(stats.total_files),
            total_size: Some(stats.total_size),
        }
    }

    /// Whether this entry is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// The aggregate of a folder entry; `None` for files.
    pub fn stats(&self) -> Option<DirStats> {
        match (self.total_files, self.total_size) {
            (Some(files), Some(size)) => Some(DirStats::new(files, size)),
            _ => None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Machine-readable error category carried next to the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request tried to leave the shared root.
    PathTraversal,
    /// A required query parameter was absent or empty.
    MissingParameter,
    /// The file or folder does not exist.
    NotFound,
    /// A download was requested for a directory.
    IsDirectory,
    /// A listing was requested for something that is not a directory.
    NotADirectory,
    /// The file system refused or failed the read.
    NotReadable,
    /// The requested byte range lies outside the file.
    InvalidRange,
    /// The request took longer than the server allows.
    Timeout,
}

/// JSON body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message. Never contains server paths.
    pub error: String,
    /// Error category.
    pub code: ErrorCode,
}

impl ErrorBody {
    /// Create an error body.
    pub fn new(code: ErrorCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}

/// Body of the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always `"ok"` while the service answers.
    pub status: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_dir_stats_add_file() {
        let mut stats = DirStats::default();
        stats.add_file(10);
        stats.add_file(5);
        assert_eq!(stats, DirStats::new(2, 15));
        assert!(!stats.is_empty());
        assert!(DirStats::EMPTY.is_empty());
    }

    #[test]
    fn test_dir_stats_sum() {
        let total: DirStats = vec![DirStats::new(1, 5), DirStats::new(2, 10), DirStats::EMPTY]
            .into_iter()
            .sum();
        assert_eq!(total, DirStats::new(3, 15));
    }

    #[test]
    fn test_dir_stats_size_saturates() {
        let total = DirStats::new(1, u64::MAX) + DirStats::new(1, 1);
        assert_eq!(total.total_files, 2);
        assert_eq!(total.total_size, u64::MAX);
    }

    #[test]
    fn test_folder_summary_json_shape() {
        let summary = FolderSummary::new("docs", DirStats::new(2, 15));
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "docs", "totalFiles": 2, "totalSize": 15})
        );
        assert_eq!(summary.stats(), DirStats::new(2, 15));
    }

    #[test]
    fn test_file_entry_json_omits_aggregate() {
        let entry = EntryDescriptor::file("a.txt", 10, timestamp());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "file");
        assert_eq!(json["size"], 10);
        assert_eq!(json["lastModified"], "2024-01-01T00:00:00Z");
        assert!(json.get("totalFiles").is_none());
        assert!(json.get("totalSize").is_none());
        assert_eq!(entry.stats(), None);
    }

    #[test]
    fn test_folder_entry_json_carries_aggregate() {
        let entry = EntryDescriptor::folder("sub", DirStats::new(1, 5), timestamp());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "folder");
        assert_eq!(json["totalFiles"], 1);
        assert_eq!(json["totalSize"], 5);
        assert_eq!(json["size"], 5);
        assert!(entry.is_folder());
    }

    #[test]
    fn test_entry_parses_without_optional_fields() {
        let json = r#"{"name":"a.txt","kind":"file","size":3,"lastModified":"2024-01-01T00:00:00Z"}"#;
        let entry: EntryDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(entry, EntryDescriptor::file("a.txt", 3, timestamp()));
    }

    #[test]
    fn test_error_body_json_shape() {
        let body = ErrorBody::new(ErrorCode::PathTraversal, "forbidden");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "forbidden", "code": "path_traversal"})
        );
    }

    #[test]
    fn test_health_status_default() {
        let json = serde_json::to_string(&HealthStatus::default()).unwrap();
        assert_eq!(json, r#"{"status":"ok"}"#);
    }
}
