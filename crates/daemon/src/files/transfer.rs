//! File downloads.
//!
//! A download is opened in full before any byte is sent: the target is
//! resolved and opened, and the open handle is checked to be a regular file
//! whose length is then known up front. The bytes are then streamed in bounded chunks by
//! [`FileDownload::into_stream`]; nothing buffers the whole file.

use std::io::SeekFrom;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::browser::modified_time;
use super::error::FsError;
use super::resolver::RootBoundary;

/// Default chunk size for streamed reads (64KB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Maximum chunk size (1MB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// An inclusive byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset, inclusive.
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false: a range covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// `Content-Range` header value for a file of `total` bytes.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// An opened download, ready to stream.
#[derive(Debug)]
pub struct FileDownload {
    /// The open file, positioned at the first byte to send.
    file: File,
    /// Name to suggest to the client.
    pub file_name: String,
    /// Full length of the file.
    pub total_size: u64,
    /// The part being served, if a range was requested.
    pub range: Option<ByteRange>,
    /// Last modification time of the file.
    pub modified: DateTime<Utc>,
}

impl FileDownload {
    /// Number of bytes the response body carries.
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some(range) => range.len(),
            None => self.total_size,
        }
    }

    /// Turn the download into a stream of chunks of at most `chunk_size`.
    ///
    /// The file is read only as fast as the stream is polled, and dropping
    /// the stream closes the file.
    pub fn into_stream(self, chunk_size: usize) -> ReaderStream<Take<File>> {
        let length = self.content_length();
        let chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        ReaderStream::with_capacity(self.file.take(length), chunk_size)
    }
}

/// Opens downloads below a [`RootBoundary`].
#[derive(Debug, Clone)]
pub struct FileTransfer {
    root: Arc<RootBoundary>,
    chunk_size: usize,
    include_hidden: bool,
}

impl FileTransfer {
    /// Create a transfer handler over `root`.
    pub fn new(root: Arc<RootBoundary>) -> Self {
        Self {
            root,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_hidden: true,
        }
    }

    /// Set whether files inside dot-entries may be downloaded.
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// Set the read chunk size, clamped to [`MAX_CHUNK_SIZE`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_CHUNK_SIZE);
        self
    }

    /// The read chunk size.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Open `file_name` inside `folder` for download.
    ///
    /// `folder/file_name` is resolved as one relative path, so a file name
    /// carrying `..` segments is checked like any other path. `range` is the
    /// raw `Range` header value, if any.
    pub async fn open_download(
        &self,
        folder: &str,
        file_name: &str,
        range: Option<&str>,
    ) -> Result<FileDownload, FsError> {
        if file_name.trim().is_empty() {
            return Err(FsError::MissingParameter("file"));
        }

        let target = self.root.resolve(&format!("{folder}/{file_name}")).await?;
        if target.is_root_of(&self.root) {
            return Err(FsError::IsDirectory);
        }
        if !self.include_hidden && target.is_hidden_below(&self.root) {
            debug!(path = %target, "Refusing hidden download");
            return Err(FsError::NotFound);
        }

        // Opening a fifo would block, so special files are refused up front.
        let precheck = tokio::fs::symlink_metadata(target.as_path())
            .await
            .map_err(FsError::from_io)?;
        if precheck.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if !precheck.is_file() {
            return Err(FsError::NotFound);
        }

        let mut file = File::open(target.as_path())
            .await
            .map_err(FsError::from_io)?;

        // The handle is authoritative; the path may have been swapped.
        let metadata = file.metadata().await.map_err(FsError::NotReadable)?;
        if metadata.is_dir() {
            return Err(FsError::IsDirectory);
        }
        if !metadata.is_file() {
            return Err(FsError::NotFound);
        }

        let total_size = metadata.len();
        let range = match range {
            Some(header) => parse_range(header, total_size)?,
            None => None,
        };

        if let Some(range) = range {
            file.seek(SeekFrom::Start(range.start))
                .await
                .map_err(FsError::NotReadable)?;
        }

        let file_name = target.file_name().unwrap_or_else(|| "download".to_string());
        debug!(path = %target, size = total_size, range = ?range, "Opened download");

        Ok(FileDownload {
            file,
            file_name,
            total_size,
            range,
            modified: modified_time(&metadata),
        })
    }
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Returns `Ok(None)` for headers that should be ignored (not a byte range,
/// malformed, or several ranges) so the full file is served. Returns
/// [`FsError::InvalidRange`] for a well-formed range the file cannot
/// satisfy.
pub fn parse_range(header: &str, size: u64) -> Result<Option<ByteRange>, FsError> {
    let Some(ranges) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if ranges.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = ranges.trim().split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());

    let range = if start.is_empty() {
        // Suffix form: the last N bytes.
        let Ok(suffix) = end.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || size == 0 {
            return Err(FsError::InvalidRange { size });
        }
        ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        }
    } else {
        let Ok(start) = start.parse::<u64>() else {
            return Ok(None);
        };
        let end = if end.is_empty() {
            u64::MAX
        } else {
            match end.parse::<u64>() {
                Ok(end) => end,
                Err(_) => return Ok(None),
            }
        };
        if end < start {
            return Ok(None);
        }
        if start >= size {
            return Err(FsError::InvalidRange { size });
        }
        ByteRange {
            start,
            end: end.min(size - 1),
        }
    };

    Ok(Some(range))
}
