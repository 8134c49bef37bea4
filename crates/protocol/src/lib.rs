//! # IgorFS Protocol Library
//!
//! Wire types for the IgorFS file service: the JSON documents returned by
//! the folder index, folder listing and error responses.
//!
//! ## Endpoints
//!
//! ```text
//! GET /api/health                       -> HealthStatus
//! GET /api/folders                      -> [FolderSummary]
//! GET /api/files?folder=..              -> [EntryDescriptor]
//! GET /api/download?folder=..&file=..   -> raw bytes
//! any failure                           -> ErrorBody
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{DirStats, FolderSummary};
//!
//! let summary = FolderSummary::new("docs", DirStats::new(2, 15));
//! let json = protocol::to_json(&summary).unwrap();
//! assert_eq!(json, r#"{"name":"docs","totalFiles":2,"totalSize":15}"#);
//!
//! let parsed: FolderSummary = protocol::from_json(json.as_bytes()).unwrap();
//! assert_eq!(parsed, summary);
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Wire type definitions
//! - [`error`]: Error types

pub mod error;
pub mod messages;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{ProtocolError, Result};
pub use messages::{
    DirStats, EntryDescriptor, EntryKind, ErrorBody, ErrorCode, FolderSummary, HealthStatus,
};

/// Encode a wire type as compact JSON.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Encode a wire type as indented JSON for terminal output.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Decode a wire type from a JSON body.
pub fn from_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| ProtocolError::Deserialization(e.to_string()))
}
