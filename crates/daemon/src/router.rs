//! HTTP router exposing the file services.
//!
//! Routes:
//! - `GET /api/health`: liveness check
//! - `GET /api/folders`: top-level folders with their aggregates
//! - `GET /api/files?folder=`: contents of one folder
//! - `GET /api/download?folder=&file=`: streamed file download
//!
//! Handlers return `Result<_, FsError>`; [`FsError`] renders itself as a JSON
//! [`ErrorBody`] with the matching status code.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use protocol::{EntryDescriptor, ErrorBody, ErrorCode, FolderSummary, HealthStatus};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::FileConfig;
use crate::files::{DirectoryAggregator, DirectoryBrowser, FileTransfer, FolderIndex, FsError, RootBoundary};

/// Shared handler state. Cloned per request; every service is behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    folders: Arc<FolderIndex>,
    browser: Arc<DirectoryBrowser>,
    transfer: Arc<FileTransfer>,
}

impl AppState {
    /// Build the services over `root`.
    ///
    /// All services share one aggregator, so the open-directory limit holds
    /// across every in-flight request.
    pub fn new(root: Arc<RootBoundary>, files: &FileConfig) -> Self {
        let aggregator =
            DirectoryAggregator::new(files.max_concurrency).include_hidden(files.include_hidden);

        Self {
            folders: Arc::new(FolderIndex::new(Arc::clone(&root), aggregator.clone())),
            browser: Arc::new(DirectoryBrowser::new(Arc::clone(&root), aggregator)),
            transfer: Arc::new(
                FileTransfer::new(root)
                    .with_chunk_size(files.chunk_size)
                    .include_hidden(files.include_hidden),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FilesQuery {
    folder: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    folder: Option<String>,
    file: Option<String>,
}

/// Build the application router.
///
/// With a `timeout`, requests that have not produced a response in time are
/// dropped (cancelling any aggregation in flight) and answered with 408.
/// The limit covers producing the response head only; a download body
/// streams for as long as the client reads it.
pub fn build_router(state: AppState, timeout: Option<Duration>) -> Router {
    let mut router = Router::new()
        .route("/api/health", get(health))
        .route("/api/folders", get(list_folders))
        .route("/api/files", get(list_files))
        .route("/api/download", get(download))
        .with_state(state);

    if let Some(limit) = timeout {
        router = router.layer(middleware::from_fn_with_state(limit, enforce_timeout));
    }

    router.layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::default())
}

async fn list_folders(State(state): State<AppState>) -> Result<Json<Vec<FolderSummary>>, FsError> {
    let folders = state.folders.list_folders().await?;
    info!(count = folders.len(), "Listed top-level folders");
    Ok(Json(folders))
}

async fn list_files(
    State(state): State<AppState>,
    Query(params): Query<FilesQuery>,
) -> Result<Json<Vec<EntryDescriptor>>, FsError> {
    let folder = required(params.folder, "folder")?;
    let entries = state.browser.list_directory(&folder).await?;
    info!(folder = %folder, count = entries.len(), "Listed folder");
    Ok(Json(entries))
}

async fn download(
    State(state): State<AppState>,
    Query(params): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, FsError> {
    let folder = required(params.folder, "folder")?;
    let file = required(params.file, "file")?;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let download = state.transfer.open_download(&folder, &file, range).await?;
    info!(
        folder = %folder,
        file = %download.file_name,
        bytes = download.content_length(),
        partial = download.range.is_some(),
        "Starting download"
    );

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, download.content_length())
        .header(header::CONTENT_DISPOSITION, content_disposition(&download.file_name))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::LAST_MODIFIED, http_date(download.modified));

    builder = match download.range {
        Some(range) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range(download.total_size)),
        None => builder.status(StatusCode::OK),
    };

    let body = Body::from_stream(download.into_stream(state.transfer.chunk_size()));
    builder
        .body(body)
        .map_err(|e| FsError::NotReadable(io::Error::other(e)))
}

/// Extract a required query parameter. Blank values count as absent.
fn required(value: Option<String>, name: &'static str) -> Result<String, FsError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(FsError::MissingParameter(name)),
    }
}

/// `Content-Disposition` for `name`, with a plain and an RFC 5987 form.
fn content_disposition(name: &str) -> String {
    let encoded = urlencoding::encode(name);
    format!("attachment; filename=\"{encoded}\"; filename*=UTF-8''{encoded}")
}

/// IMF-fixdate, as used by `Last-Modified`.
fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn enforce_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let uri = request.uri().clone();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(uri = %uri, limit_ms = limit.as_millis() as u64, "Request timed out");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(ErrorBody::new(ErrorCode::Timeout, "request timed out")),
            )
                .into_response()
        }
    }
}

impl FsError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            FsError::PathTraversal => StatusCode::FORBIDDEN,
            FsError::MissingParameter(_) | FsError::IsDirectory | FsError::NotADirectory => {
                StatusCode::BAD_REQUEST
            }
            FsError::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            FsError::NotFound | FsError::NotReadable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FsError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_client_error() {
            debug!(status = status.as_u16(), error = %self, "Rejected request");
        } else {
            error!(status = status.as_u16(), error = ?self, "Request failed");
        }

        let body = Json(ErrorBody::new(self.code(), self.to_string()));
        match self {
            FsError::InvalidRange { size } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{size}"))],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
