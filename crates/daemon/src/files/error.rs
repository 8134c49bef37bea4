//! Error taxonomy shared by the file services.
//!
//! Messages are safe to send to clients: no variant renders a server-side
//! path. The underlying I/O error of [`FsError::NotReadable`] is kept as the
//! error source for logging only.

use std::io;

use protocol::ErrorCode;
use thiserror::Error;

/// Errors produced while resolving, listing, aggregating or downloading.
#[derive(Debug, Error)]
pub enum FsError {
    /// The request resolves outside the shared root.
    #[error("access outside the shared folder is forbidden")]
    PathTraversal,

    /// A required query parameter is absent or empty.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// The target does not exist.
    #[error("file or folder not found")]
    NotFound,

    /// A download was requested for a directory.
    #[error("cannot download a directory")]
    IsDirectory,

    /// A listing was requested for something other than a directory.
    #[error("not a directory")]
    NotADirectory,

    /// Permission or I/O failure while reading.
    #[error("file system entry could not be read")]
    NotReadable(#[source] io::Error),

    /// The requested byte range lies outside the file.
    #[error("requested range not satisfiable")]
    InvalidRange {
        /// Size of the file the range was checked against.
        size: u64,
    },
}

impl FsError {
    /// Translate an I/O error into the taxonomy.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => FsError::NotFound,
            _ => FsError::NotReadable(err),
        }
    }

    /// The wire error category.
    pub fn code(&self) -> ErrorCode {
        match self {
            FsError::PathTraversal => ErrorCode::PathTraversal,
            FsError::MissingParameter(_) => ErrorCode::MissingParameter,
            FsError::NotFound => ErrorCode::NotFound,
            FsError::IsDirectory => ErrorCode::IsDirectory,
            FsError::NotADirectory => ErrorCode::NotADirectory,
            FsError::NotReadable(_) => ErrorCode::NotReadable,
            FsError::InvalidRange { .. } => ErrorCode::InvalidRange,
        }
    }

    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, FsError::NotFound | FsError::NotReadable(_))
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        FsError::from_io(err)
    }
}
